use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::ErrorKind;
use super::value::NetValue;
use crate::registry::ObjectSchema;

const COMMANDS: [&str; 4] = ["hi", "j", "l", "disconnect"];

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown control command '{0}'")]
    UnknownCommand(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Protocol
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    #[serde(rename = "hn")]
    pub host_nid: u16,
    #[serde(rename = "n")]
    pub nid: u16,
    #[serde(rename = "d")]
    pub client_delay: f64,
    #[serde(rename = "u")]
    pub update_rate: f64,
    pub objs: BTreeMap<String, ObjectSchema>,
    #[serde(rename = "cvs")]
    pub client_values: Vec<NetValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "c")]
pub enum ControlMessage {
    #[serde(rename = "hi")]
    Welcome(Welcome),
    #[serde(rename = "j")]
    PeerJoined {
        #[serde(rename = "i")]
        id: String,
        #[serde(rename = "n")]
        nid: u16,
        #[serde(rename = "a")]
        alias: String,
    },
    #[serde(rename = "l")]
    PeerLeft {
        #[serde(rename = "i")]
        id: String,
        #[serde(rename = "a")]
        alias: String,
        #[serde(rename = "r")]
        reason: String,
    },
    #[serde(rename = "disconnect")]
    Disconnect {
        #[serde(rename = "r")]
        reason: String,
    },
}

impl ControlMessage {
    pub fn to_text(&self) -> Result<String, ControlError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextMessage {
    Ping(String),
    Pong { id: u32, host_time: Option<f64> },
    Control(ControlMessage),
    User(Value),
}

pub fn format_ping(id: u32) -> String {
    format!("ping:{id}")
}

pub fn format_pong(echo: &str, host_time: Option<f64>) -> String {
    match host_time {
        Some(t) => format!("pong:{echo}/{}", t.round()),
        None => format!("pong:{echo}"),
    }
}

fn parse_pong(text: &str) -> Option<TextMessage> {
    let (_, rest) = text.split_once(':')?;
    let (id, host_time) = match rest.split_once('/') {
        Some((id, t)) => (id, Some(t.trim().parse::<f64>().ok()?)),
        None => (rest, None),
    };
    let id = id.trim().parse::<u32>().ok()?;
    Some(TextMessage::Pong { id, host_time })
}

/// Classifies an inbound text frame.
///
/// Returns `Ok(None)` for frames that are silently dropped: blank or too
/// short to be meaningful, and pongs whose id does not parse.
pub fn parse_text(text: &str) -> Result<Option<TextMessage>, ControlError> {
    if text.trim().is_empty() || text.len() < 4 {
        return Ok(None);
    }

    if text.starts_with("ping") {
        let echo = text.get(5..).unwrap_or_default();
        return Ok(Some(TextMessage::Ping(echo.to_string())));
    }
    if text.starts_with("pong") {
        let pong = parse_pong(text);
        if pong.is_none() {
            log::debug!("Discarding unparseable pong '{}'", text);
        }
        return Ok(pong);
    }

    let value: Value = serde_json::from_str(text)?;
    let command = match value.get("c").and_then(Value::as_str) {
        Some(c) if c != "m" => c.to_string(),
        _ => return Ok(Some(TextMessage::User(value))),
    };
    if !COMMANDS.contains(&command.as_str()) {
        return Err(ControlError::UnknownCommand(command));
    }
    let message = serde_json::from_value(value)?;
    Ok(Some(TextMessage::Control(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::value::Precision;
    use crate::snapshot::Interp;

    #[test]
    fn short_and_blank_frames_are_dropped() {
        assert!(parse_text("").unwrap().is_none());
        assert!(parse_text("   \n\t ").unwrap().is_none());
        assert!(parse_text("{}").unwrap().is_none());
    }

    #[test]
    fn ping_pong_text() {
        assert_eq!(format_ping(17), "ping:17");
        assert_eq!(
            parse_text("ping:17").unwrap(),
            Some(TextMessage::Ping("17".to_string()))
        );
        assert_eq!(format_pong("17", Some(1234.6)), "pong:17/1235");
        assert_eq!(format_pong("17", None), "pong:17");

        assert_eq!(
            parse_text("pong:17/1235").unwrap(),
            Some(TextMessage::Pong {
                id: 17,
                host_time: Some(1235.0)
            })
        );
        assert_eq!(
            parse_text("pong:3").unwrap(),
            Some(TextMessage::Pong {
                id: 3,
                host_time: None
            })
        );
    }

    #[test]
    fn malformed_pongs_are_discarded() {
        for text in ["pong", "pong:", "pong:abc", "pong:12/xyz", "pongpong"] {
            assert!(parse_text(text).unwrap().is_none(), "{text}");
        }
    }

    #[test]
    fn user_messages_pass_through() {
        let msg = parse_text(r#"{"c":"m","t":"chat","m":"hello"}"#).unwrap();
        assert!(matches!(msg, Some(TextMessage::User(v)) if v["m"] == "hello"));

        let msg = parse_text(r#"{"score":12}"#).unwrap();
        assert!(matches!(msg, Some(TextMessage::User(_))));
    }

    #[test]
    fn control_messages() {
        let msg = parse_text(r#"{"c":"j","i":"abc","n":4,"a":"Player"}"#).unwrap();
        assert_eq!(
            msg,
            Some(TextMessage::Control(ControlMessage::PeerJoined {
                id: "abc".into(),
                nid: 4,
                alias: "Player".into()
            }))
        );

        let text = ControlMessage::Disconnect {
            reason: "timeout".into(),
        }
        .to_text()
        .unwrap();
        assert_eq!(text, r#"{"c":"disconnect","r":"timeout"}"#);
    }

    #[test]
    fn welcome_round_trip() {
        let welcome = ControlMessage::Welcome(Welcome {
            host_nid: 1,
            nid: 2,
            client_delay: 80.0,
            update_rate: 30.0,
            objs: BTreeMap::new(),
            client_values: vec![NetValue::new("mx", Precision::Int16, Interp::None)],
        });
        let text = welcome.to_text().unwrap();
        assert!(text.starts_with(r#"{"c":"hi","hn":1,"n":2,"d":80.0,"u":30.0"#));
        assert_eq!(
            parse_text(&text).unwrap(),
            Some(TextMessage::Control(welcome))
        );
    }

    #[test]
    fn bad_json_and_unknown_commands() {
        assert!(matches!(parse_text("{not json"), Err(ControlError::Json(_))));
        assert!(matches!(
            parse_text(r#"{"c":"teleport"}"#),
            Err(ControlError::UnknownCommand(c)) if c == "teleport"
        ));
        assert!(matches!(parse_text(r#"{"c":"j","i":5}"#), Err(ControlError::Json(_))));
    }
}
