use crate::domain::DecodeError;
use serde::Deserialize;
use serde_json::Value;

/// One object to materialize locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub bucket: String,
    pub key: String,
}

/// Outer pub/sub envelope wrapping a storage event
///
/// Only `Message` is required. The remaining fields are carried so an
/// `EnvelopeVerifier` can inspect them; nothing here has been authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Type")]
    pub notification_type: Option<String>,
    #[serde(rename = "MessageId")]
    pub message_id: Option<String>,
    #[serde(rename = "TopicArn")]
    pub topic_arn: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "SignatureVersion")]
    pub signature_version: Option<String>,
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
    #[serde(rename = "SigningCertURL")]
    pub signing_cert_url: Option<String>,
}

/// Result of decoding one queue message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNotification {
    pub envelope: NotificationEnvelope,
    pub tasks: Vec<DownloadTask>,
}

/// Parses notification bodies into download tasks
///
/// Two layers are unwrapped: the envelope JSON, then the storage event JSON
/// embedded as a string in its `Message` field.
#[derive(Debug, Clone)]
pub struct NotificationDecoder {
    decode_object_keys: bool,
}

impl Default for NotificationDecoder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NotificationDecoder {
    /// `decode_object_keys` form-decodes keys (`+` and `%XX`), which is how
    /// S3 event notifications encode them.
    pub fn new(decode_object_keys: bool) -> Self {
        Self { decode_object_keys }
    }

    pub fn decode(&self, body: &str) -> Result<DecodedNotification, DecodeError> {
        let envelope: NotificationEnvelope =
            serde_json::from_str(body).map_err(DecodeError::InvalidEnvelope)?;

        let message = envelope
            .message
            .as_deref()
            .ok_or(DecodeError::MissingMessage)?;

        let event: Value = serde_json::from_str(message).map_err(DecodeError::InvalidEvent)?;

        let records = event
            .get("Records")
            .and_then(Value::as_array)
            .ok_or(DecodeError::MissingRecords)?;

        let tasks = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.decode_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DecodedNotification { envelope, tasks })
    }

    fn decode_record(&self, index: usize, record: &Value) -> Result<DownloadTask, DecodeError> {
        let bucket = record
            .pointer("/s3/bucket/name")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField {
                index,
                field: "s3.bucket.name",
            })?;

        let raw_key = record
            .pointer("/s3/object/key")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField {
                index,
                field: "s3.object.key",
            })?;

        let key = if self.decode_object_keys {
            decode_object_key(raw_key).ok_or_else(|| DecodeError::InvalidObjectKey {
                index,
                key: raw_key.to_string(),
            })?
        } else {
            raw_key.to_string()
        };

        Ok(DownloadTask {
            bucket: bucket.to_string(),
            key,
        })
    }
}

fn decode_object_key(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|key| key.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_with_event(event: Value) -> String {
        json!({
            "Type": "Notification",
            "MessageId": "sns-1",
            "TopicArn": "arn:aws:sns:eu-west-2:123456789012:uploads",
            "Message": event.to_string(),
        })
        .to_string()
    }

    fn body_with_records(records: &[(&str, &str)]) -> String {
        let records: Vec<Value> = records
            .iter()
            .map(|(bucket, key)| json!({ "s3": { "bucket": { "name": bucket }, "object": { "key": key } } }))
            .collect();
        body_with_event(json!({ "Records": records }))
    }

    #[test]
    fn test_decode_preserves_record_order() {
        let body = body_with_records(&[("b1", "first.txt"), ("b2", "second/x.bin"), ("b1", "third")]);

        let decoded = NotificationDecoder::default().decode(&body).unwrap();

        let pairs: Vec<(&str, &str)> = decoded
            .tasks
            .iter()
            .map(|t| (t.bucket.as_str(), t.key.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("b1", "first.txt"), ("b2", "second/x.bin"), ("b1", "third")]
        );
        assert_eq!(
            decoded.envelope.topic_arn.as_deref(),
            Some("arn:aws:sns:eu-west-2:123456789012:uploads")
        );
    }

    #[test]
    fn test_decode_empty_records() {
        let decoded = NotificationDecoder::default()
            .decode(&body_with_records(&[]))
            .unwrap();
        assert!(decoded.tasks.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed_body() {
        let result = NotificationDecoder::default().decode("not json");
        assert!(matches!(result, Err(DecodeError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_decode_requires_message_field() {
        let body = json!({ "Type": "Notification" }).to_string();
        let result = NotificationDecoder::default().decode(&body);
        assert!(matches!(result, Err(DecodeError::MissingMessage)));
    }

    #[test]
    fn test_decode_rejects_malformed_inner_event() {
        let body = json!({ "Message": "{not json" }).to_string();
        let result = NotificationDecoder::default().decode(&body);
        assert!(matches!(result, Err(DecodeError::InvalidEvent(_))));
    }

    #[test]
    fn test_decode_requires_records() {
        let body = body_with_event(json!({ "Event": "s3:TestEvent" }));
        let result = NotificationDecoder::default().decode(&body);
        assert!(matches!(result, Err(DecodeError::MissingRecords)));
    }

    #[test]
    fn test_decode_names_record_missing_key() {
        let body = body_with_event(json!({
            "Records": [
                { "s3": { "bucket": { "name": "ok" }, "object": { "key": "fine" } } },
                { "s3": { "bucket": { "name": "ok" }, "object": {} } }
            ]
        }));

        let result = NotificationDecoder::default().decode(&body);
        assert!(matches!(
            result,
            Err(DecodeError::MissingField {
                index: 1,
                field: "s3.object.key"
            })
        ));
    }

    #[test]
    fn test_decode_names_record_missing_bucket() {
        let body = body_with_event(json!({ "Records": [{ "s3": { "object": { "key": "k" } } }] }));

        let result = NotificationDecoder::default().decode(&body);
        assert!(matches!(
            result,
            Err(DecodeError::MissingField {
                index: 0,
                field: "s3.bucket.name"
            })
        ));
    }

    #[test]
    fn test_decode_url_encoded_keys() {
        let body = body_with_records(&[("bkt", "reports/q1+summary%282024%29.csv")]);

        let decoded = NotificationDecoder::new(true).decode(&body).unwrap();
        assert_eq!(decoded.tasks[0].key, "reports/q1 summary(2024).csv");

        let raw = NotificationDecoder::new(false).decode(&body).unwrap();
        assert_eq!(raw.tasks[0].key, "reports/q1+summary%282024%29.csv");
    }
}
