use crate::error::{Error, Result};

/// Default key expression prefix for every shmbridge channel.
pub const KEY_PREFIX: &str = "shmbridge";

/// Builder for the key expressions channels are bound to.
///
/// Key expressions follow the pattern:
/// `<prefix>/<domain_id>/<topic>`
#[derive(Debug, Clone)]
pub struct TopicKeyBuilder {
    prefix: String,
}

impl Default for TopicKeyBuilder {
    fn default() -> Self {
        Self::new(KEY_PREFIX)
    }
}

impl TopicKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key expression of a topic in a domain.
    ///
    /// # Example
    /// ```
    /// use shmbridge_common::keyexpr::TopicKeyBuilder;
    ///
    /// let key = TopicKeyBuilder::default().build(0, "rt/commonCamera_t").unwrap();
    /// assert_eq!(key, "shmbridge/0/rt/commonCamera_t");
    /// ```
    pub fn build(&self, domain_id: u32, topic: &str) -> Result<String> {
        validate_topic(topic)?;
        Ok(format!("{}/{}/{}", self.prefix, domain_id, topic))
    }

    /// Wildcard matching every topic of a domain.
    pub fn domain_wildcard(&self, domain_id: u32) -> String {
        format!("{}/{}/**", self.prefix, domain_id)
    }
}

/// Check that a topic name can be used as the tail of a key expression.
pub fn validate_topic(topic: &str) -> Result<()> {
    let invalid = |reason: &str| Error::Topic {
        topic: topic.to_string(),
        reason: reason.to_string(),
    };

    if topic.is_empty() {
        return Err(invalid("topic name is empty"));
    }
    if topic.starts_with('/') || topic.ends_with('/') {
        return Err(invalid("leading or trailing '/'"));
    }
    if topic.contains("//") {
        return Err(invalid("empty path segment"));
    }
    if let Some(c) = topic.chars().find(|c| matches!(c, '*' | '$' | '?' | '#')) {
        return Err(invalid(&format!("reserved character '{}'", c)));
    }
    Ok(())
}

/// Split a key expression back into domain and topic.
pub fn parse_topic_key<'a>(prefix: &str, key: &'a str) -> Option<(u32, &'a str)> {
    let rest = key.strip_prefix(prefix)?.strip_prefix('/')?;
    let (domain, topic) = rest.split_once('/')?;
    let domain = domain.parse().ok()?;
    if topic.is_empty() {
        return None;
    }
    Some((domain, topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key() {
        let builder = TopicKeyBuilder::new("robot");
        assert_eq!(builder.build(3, "rt/arm_state").unwrap(), "robot/3/rt/arm_state");
        assert_eq!(builder.domain_wildcard(3), "robot/3/**");
    }

    #[test]
    fn test_invalid_topics() {
        let builder = TopicKeyBuilder::default();
        assert!(builder.build(0, "").is_err());
        assert!(builder.build(0, "/rt/cam").is_err());
        assert!(builder.build(0, "rt/cam/").is_err());
        assert!(builder.build(0, "rt//cam").is_err());
        assert!(builder.build(0, "rt/*").is_err());
        assert!(builder.build(0, "rt/$cam").is_err());
    }

    #[test]
    fn test_parse_topic_key() {
        assert_eq!(
            parse_topic_key("shmbridge", "shmbridge/0/rt/commonCamera_t"),
            Some((0, "rt/commonCamera_t"))
        );
        assert_eq!(parse_topic_key("shmbridge", "other/0/rt/cam"), None);
        assert_eq!(parse_topic_key("shmbridge", "shmbridge/x/rt/cam"), None);
        assert_eq!(parse_topic_key("shmbridge", "shmbridge/0/"), None);
    }
}
