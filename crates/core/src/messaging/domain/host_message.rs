//! JSON messages an embedding host (browser bridge, test driver) sends to the
//! coordinator, one object per line.
//!
//! ```json
//! {"type":"regionFound","region":{"x":0,"y":0,"width":640,"height":480,"is_playing":true}}
//! {"type":"regionLost"}
//! {"type":"targetClosed","target":"tab-1"}
//! ```

use serde::Deserialize;

use crate::messaging::domain::messages::CoordinatorEvent;
use crate::session::domain::target::TargetId;
use crate::shared::region::Region;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HostMessage {
    RegionFound { region: Region },
    RegionLost,
    TargetClosed { target: TargetId },
}

/// Maps one line to a coordinator event. Anything that does not decode
/// becomes [`CoordinatorEvent::Unknown`] named after its `type` field.
pub fn decode_host_message(line: &str) -> CoordinatorEvent {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => {
            return CoordinatorEvent::Unknown {
                kind: "<malformed>".into(),
            }
        }
    };
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("<untyped>")
        .to_string();
    match serde_json::from_value::<HostMessage>(value) {
        Ok(HostMessage::RegionFound { region }) => CoordinatorEvent::RegionFound(region),
        Ok(HostMessage::RegionLost) => CoordinatorEvent::RegionLost,
        Ok(HostMessage::TargetClosed { target }) => CoordinatorEvent::TargetClosed(target),
        Err(_) => CoordinatorEvent::Unknown { kind },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_region_found_decodes() {
        let event = decode_host_message(
            r#"{"type":"regionFound","region":{"x":10,"y":20,"width":640,"height":480,"is_playing":true}}"#,
        );
        match event {
            CoordinatorEvent::RegionFound(region) => {
                assert_eq!(region, Region::new(10, 20, 640, 480, true))
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_target_closed_and_region_lost_decode() {
        assert!(matches!(
            decode_host_message(r#"{"type":"targetClosed","target":"tab-1"}"#),
            CoordinatorEvent::TargetClosed(TargetId(id)) if id == "tab-1"
        ));
        assert!(matches!(
            decode_host_message(r#"{"type":"regionLost"}"#),
            CoordinatorEvent::RegionLost
        ));
    }

    #[rstest]
    #[case(r#"{"type":"legacyPing"}"#, "legacyPing")]
    #[case(r#"{"type":"regionFound"}"#, "regionFound")]
    #[case(r#"{"region":null}"#, "<untyped>")]
    #[case("not json", "<malformed>")]
    fn test_undecodable_lines_become_unknown(#[case] line: &str, #[case] expected: &str) {
        match decode_host_message(line) {
            CoordinatorEvent::Unknown { kind } => assert_eq!(kind, expected),
            other => panic!("unexpected {}", other.kind()),
        }
    }
}
