use serde::{Deserialize, Serialize};

/// Processor construction parameters.
///
/// Passed by value from the coordinator to whichever context executes the
/// processor, so they must stay plain serialisable data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "processor", rename_all = "lowercase")]
pub enum ProcessorParams {
    File,
    Image {
        max_size: Option<u32>,
        quality: u8,
        thumbnail_size: Vec<u32>,
    },
    Video {
        preview_size: Vec<u32>,
        crf: u8,
        preset: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_task_payload_encoding() {
        let params = ProcessorParams::Video {
            preview_size: vec![854, 480],
            crf: 28,
            preset: "fast".to_string(),
        };
        let payload = serde_json::to_string(&params).unwrap();
        assert!(payload.contains("\"processor\":\"video\""));
        let decoded: ProcessorParams = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, params);
    }
}
