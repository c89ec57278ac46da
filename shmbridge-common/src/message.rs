//! Message types carried over channels.
//!
//! Every payload declares its [`PayloadShape`] up front, so consumers decide
//! once per channel whether they are looking at an image, a flat data array
//! or a composite record instead of probing each sample.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Known payload layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    /// Raw image buffer in an `image` field.
    Image,
    /// Flat array in a `data` field.
    Data,
    /// Record made of other messages.
    Composite,
}

impl PayloadShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadShape::Image => "image",
            PayloadShape::Data => "data",
            PayloadShape::Composite => "composite",
        }
    }
}

impl std::fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload type that can be bound to a channel.
pub trait Message: Serialize + DeserializeOwned + Send + 'static {
    /// Type name registered with the transport for the topic.
    const TYPE_NAME: &'static str;

    /// Declared layout of the payload.
    const SHAPE: PayloadShape;

    /// Number of elements in the primary field (image bytes, array
    /// entries, or populated sub-messages for composites).
    fn content_len(&self) -> usize;

    /// Sender-side timestamp in seconds since the Unix epoch, when the
    /// type carries one.
    fn timestamp(&self) -> Option<f64> {
        None
    }
}

/// Type descriptor of a channel, resolved once from its message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: &'static str,
    pub shape: PayloadShape,
}

impl StructType {
    pub fn of<T: Message>() -> Self {
        Self {
            name: T::TYPE_NAME,
            shape: T::SHAPE,
        }
    }
}

/// Camera frame (BGR8, row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    #[serde(with = "bytes_field")]
    pub image: Vec<u8>,
    pub timestamp: f64,
}

impl CameraFrame {
    pub fn new(image: Vec<u8>, timestamp: f64) -> Self {
        Self { image, timestamp }
    }
}

impl Message for CameraFrame {
    const TYPE_NAME: &'static str = "shmbridge::CameraFrame";
    const SHAPE: PayloadShape = PayloadShape::Image;

    fn content_len(&self) -> usize {
        self.image.len()
    }

    fn timestamp(&self) -> Option<f64> {
        Some(self.timestamp)
    }
}

/// Array of floating point values (joint positions, gripper widths...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatArray {
    pub data: Vec<f64>,
    pub timestamp: f64,
}

impl FloatArray {
    pub fn new(data: Vec<f64>, timestamp: f64) -> Self {
        Self { data, timestamp }
    }
}

impl Message for FloatArray {
    const TYPE_NAME: &'static str = "shmbridge::FloatArray";
    const SHAPE: PayloadShape = PayloadShape::Data;

    fn content_len(&self) -> usize {
        self.data.len()
    }

    fn timestamp(&self) -> Option<f64> {
        Some(self.timestamp)
    }
}

/// Array of raw bytes. Carries no timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByteArray {
    #[serde(with = "bytes_field")]
    pub data: Vec<u8>,
}

impl ByteArray {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Message for ByteArray {
    const TYPE_NAME: &'static str = "shmbridge::ByteArray";
    const SHAPE: PayloadShape = PayloadShape::Data;

    fn content_len(&self) -> usize {
        self.data.len()
    }
}

/// Joint state of a dual-arm robot with grippers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualArmState {
    pub left_arm_q: FloatArray,
    pub right_arm_q: FloatArray,
    pub left_gripper: FloatArray,
    pub right_gripper: FloatArray,
    pub timestamp: f64,
}

impl Message for DualArmState {
    const TYPE_NAME: &'static str = "shmbridge::DualArmState";
    const SHAPE: PayloadShape = PayloadShape::Composite;

    fn content_len(&self) -> usize {
        [
            &self.left_arm_q,
            &self.right_arm_q,
            &self.left_gripper,
            &self.right_gripper,
        ]
        .iter()
        .filter(|part| !part.data.is_empty())
        .count()
    }

    fn timestamp(&self) -> Option<f64> {
        Some(self.timestamp)
    }
}

/// Joint deltas and gripper commands for a dual-arm robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualArmCommand {
    pub left_arm_joint_delta: FloatArray,
    pub right_arm_joint_delta: FloatArray,
    pub left_gripper_action: ByteArray,
    pub right_gripper_action: ByteArray,
    pub timestamp: f64,
}

impl Message for DualArmCommand {
    const TYPE_NAME: &'static str = "shmbridge::DualArmCommand";
    const SHAPE: PayloadShape = PayloadShape::Composite;

    fn content_len(&self) -> usize {
        let arms = [&self.left_arm_joint_delta, &self.right_arm_joint_delta]
            .iter()
            .filter(|part| !part.data.is_empty())
            .count();
        let grippers = [&self.left_gripper_action, &self.right_gripper_action]
            .iter()
            .filter(|part| !part.data.is_empty())
            .count();
        arms + grippers
    }

    fn timestamp(&self) -> Option<f64> {
        Some(self.timestamp)
    }
}

/// Serialize `Vec<u8>` as a byte string instead of a sequence of integers.
mod bytes_field {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_byte_buf(BytesVisitor)
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a byte string or a sequence of bytes")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        // JSON has no byte strings and encodes them as integer arrays.
        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element::<u8>()? {
                out.push(b);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{Format, decode, encode};

    #[test]
    fn test_struct_type_resolution() {
        let camera = StructType::of::<CameraFrame>();
        assert_eq!(camera.shape, PayloadShape::Image);
        assert_eq!(camera.name, "shmbridge::CameraFrame");

        assert_eq!(StructType::of::<FloatArray>().shape, PayloadShape::Data);
        assert_eq!(StructType::of::<ByteArray>().shape, PayloadShape::Data);
        assert_eq!(
            StructType::of::<DualArmState>().shape,
            PayloadShape::Composite
        );
    }

    #[test]
    fn test_content_len() {
        assert_eq!(CameraFrame::new(vec![0; 12], 0.0).content_len(), 12);
        assert_eq!(FloatArray::new(vec![0.1; 7], 0.0).content_len(), 7);
        assert_eq!(ByteArray::new(Vec::new()).content_len(), 0);

        let state = DualArmState {
            left_arm_q: FloatArray::new(vec![0.1; 7], 0.0),
            right_arm_q: FloatArray::new(vec![0.2; 7], 0.0),
            left_gripper: FloatArray::new(vec![1.0], 0.0),
            right_gripper: FloatArray::new(Vec::new(), 0.0),
            timestamp: 0.0,
        };
        assert_eq!(state.content_len(), 3);
    }

    #[test]
    fn test_byte_array_has_no_timestamp() {
        assert_eq!(ByteArray::new(vec![1]).timestamp(), None);
        assert_eq!(CameraFrame::new(vec![1], 4.0).timestamp(), Some(4.0));
    }

    #[test]
    fn test_bytes_field_through_json() {
        let command = DualArmCommand {
            left_arm_joint_delta: FloatArray::new(vec![0.1; 7], 1.0),
            right_arm_joint_delta: FloatArray::new(vec![0.2; 7], 1.0),
            left_gripper_action: ByteArray::new(vec![1]),
            right_gripper_action: ByteArray::new(vec![0]),
            timestamp: 1.0,
        };

        let json = encode(&command, Format::Json).unwrap();
        let decoded: DualArmCommand = decode(&json, Format::Json).unwrap();
        assert_eq!(decoded, command);
        assert_eq!(decoded.content_len(), 4);
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(PayloadShape::Image.to_string(), "image");
        assert_eq!(PayloadShape::Composite.to_string(), "composite");
    }
}
