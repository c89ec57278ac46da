use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Wire encoding of channel payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON (readable with any Zenoh tool, large for binary fields).
    Json,

    /// CBOR (compact binary, the default since image payloads dominate).
    #[default]
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }
}

/// Encode a payload to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a payload using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CameraFrame, FloatArray};

    #[test]
    fn test_cbor_keeps_image_bytes_compact() {
        let frame = CameraFrame::new(vec![7u8; 1024], 1.5);

        let json = encode(&frame, Format::Json).unwrap();
        let cbor = encode(&frame, Format::Cbor).unwrap();

        assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");
        assert!(cbor.len() < 1024 + 64);

        let decoded: CameraFrame = decode(&cbor, Format::Cbor).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_json_payload() {
        let array = FloatArray::new(vec![0.5, 1.5], 2.0);
        let json = encode(&array, Format::Json).unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"data\":[0.5,1.5]"));

        let decoded: FloatArray = decode(&json, Format::Json).unwrap();
        assert_eq!(decoded, array);
    }

    #[test]
    fn test_decode_with_wrong_format_fails() {
        let array = FloatArray::new(vec![1.0], 0.0);
        let json = encode(&array, Format::Json).unwrap();
        assert!(decode::<FloatArray>(&json, Format::Cbor).is_err());
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(Format::Json.mime_type(), "application/json");
        assert_eq!(Format::Cbor.mime_type(), "application/cbor");
    }
}
