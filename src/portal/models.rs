/// Portal data models
///
/// Field names follow the portal's JSON. Identifiers arrive either as
/// strings or as numbers depending on the endpoint, so they are read
/// leniently into `String`.
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Signed-state code of documents that still need the organisation's signature
pub const SIGNATURE_REQUIRED: &str = "2";

/// Document returned by the signing bundle search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "EMDRegistry_ObjectID", default, deserialize_with = "lenient_string")]
    pub id: String,

    /// Registry object name, which is also the document type
    #[serde(rename = "EMDRegistry_ObjectName", default, deserialize_with = "lenient_string")]
    pub doc_type: String,

    #[serde(rename = "Document_Name", default, deserialize_with = "lenient_string")]
    pub name: String,

    #[serde(rename = "Document_Num", default, deserialize_with = "lenient_string")]
    pub num: String,

    #[serde(rename = "EMDVersion_id", default, deserialize_with = "lenient_string")]
    pub version_id: String,

    #[serde(rename = "EMDVersion_VersionNum", default, deserialize_with = "lenient_i64")]
    pub version_num: i64,

    #[serde(rename = "IsSigned", default, deserialize_with = "lenient_string")]
    pub signed_state: String,

    #[serde(rename = "Error_Msg", default)]
    pub error_msg: Option<String>,
}

impl Document {
    pub fn requires_signature(&self) -> bool {
        self.signed_state == SIGNATURE_REQUIRED
    }

    /// Error the portal already recorded against this document, if any
    pub fn remote_error(&self) -> Option<&str> {
        self.error_msg
            .as_deref()
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{} - {} ({})'", self.name, self.num, self.version_num)
    }
}

/// Certificate registered on the portal for the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCertificate {
    #[serde(rename = "EMDCertificate_id", default, deserialize_with = "lenient_string")]
    pub id: String,

    /// SHA-1 thumbprint as stored by the portal (e.g. `0x3F...`)
    #[serde(rename = "EMDCertificate_SHA1", default, deserialize_with = "lenient_string")]
    pub sha1: String,
}

/// Generic success/error reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub success: bool,

    #[serde(rename = "Error_Msg", default)]
    pub error_msg: Option<String>,
}

impl StatusReply {
    pub fn message(&self, fallback: &str) -> String {
        error_message(&self.error_msg, fallback)
    }
}

/// One item to sign
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignPayload {
    #[serde(rename = "docBase64", default)]
    pub doc_base64: String,

    #[serde(rename = "hashBase64", default)]
    pub hash_base64: String,

    #[serde(default)]
    pub link: Option<String>,

    #[serde(rename = "EMDVersion_id", default)]
    pub version_id: Option<serde_json::Value>,
}

/// Reply of the sign-data endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignPayloadReply {
    #[serde(default)]
    pub success: bool,

    #[serde(rename = "Error_Msg", default)]
    pub error_msg: Option<String>,

    #[serde(rename = "toSign", default)]
    pub to_sign: Vec<SignPayload>,
}

impl SignPayloadReply {
    pub fn message(&self, fallback: &str) -> String {
        error_message(&self.error_msg, fallback)
    }
}

/// Reply of the save-signature endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitReply {
    #[serde(default)]
    pub success: bool,

    #[serde(rename = "Error_Msg", default)]
    pub error_msg: Option<String>,

    #[serde(rename = "EMDSignatures_id", default, deserialize_with = "lenient_string")]
    pub signature_id: String,
}

impl SubmitReply {
    pub fn message(&self, fallback: &str) -> String {
        error_message(&self.error_msg, fallback)
    }
}

fn error_message(msg: &Option<String>, fallback: &str) -> String {
    msg.as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Accept a JSON string, number, bool or null as a string
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Accept a JSON number or numeric string as an integer
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("not an integer: {}", n))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("not an integer: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unexpected version number: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_portal_json() {
        let json = r#"{
            "Document_Name": "Protocol",
            "Document_Num": 1234,
            "EMDRegistry_ObjectID": 998877,
            "EMDRegistry_ObjectName": "EvnPL",
            "EMDVersion_id": "55",
            "EMDVersion_VersionNum": "3",
            "IsSigned": "2",
            "Error_Msg": null
        }"#;

        let doc: Document = serde_json::from_str(json).unwrap();

        assert_eq!(doc.id, "998877");
        assert_eq!(doc.num, "1234");
        assert_eq!(doc.doc_type, "EvnPL");
        assert_eq!(doc.version_num, 3);
        assert!(doc.requires_signature());
        assert_eq!(doc.remote_error(), None);
        assert_eq!(doc.to_string(), "'Protocol - 1234 (3)'");
    }

    #[test]
    fn test_blank_error_is_not_an_error() {
        let doc: Document =
            serde_json::from_str(r#"{"IsSigned": "2", "Error_Msg": "  "}"#).unwrap();
        assert_eq!(doc.remote_error(), None);

        let doc: Document =
            serde_json::from_str(r#"{"IsSigned": "1", "Error_Msg": "bad"}"#).unwrap();
        assert_eq!(doc.remote_error(), Some("bad"));
        assert!(!doc.requires_signature());
    }

    #[test]
    fn test_sign_payload_reply() {
        let json = r#"{"success": true, "toSign": [{"docBase64": "AAA=", "hashBase64": "BBB="}]}"#;
        let reply: SignPayloadReply = serde_json::from_str(json).unwrap();
        assert!(reply.success);
        assert_eq!(reply.to_sign.len(), 1);
        assert_eq!(reply.to_sign[0].hash_base64, "BBB=");
    }

    #[test]
    fn test_status_message_fallback() {
        let reply = StatusReply {
            success: false,
            error_msg: Some(String::new()),
        };
        assert_eq!(reply.message("check failed"), "check failed");

        let reply = StatusReply {
            success: false,
            error_msg: Some("Document is locked".to_string()),
        };
        assert_eq!(reply.message("check failed"), "Document is locked");
    }
}
