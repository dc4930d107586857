//! Event-driven cache updates (§4.3 "Event-driven updates"): translates
//! the synthetic Events API payloads the handler pipeline already sees
//! into `Mutation`s, so channel membership and user records stay fresh
//! between sync sweeps instead of only refreshing on the next pager run.

use super::mutation::Mutation;
use serde_json::Value;
use std::time::Duration;

/// Returns the mutation implied by one inbound Events API envelope
/// payload, if any. `bot_user_id` scopes `member_joined_channel` /
/// `member_left_channel` to the bot's own membership, since Slack fires
/// both events for every member change in a channel the bot is in, not
/// just for the bot itself.
pub fn mutation_for_event(payload: &Value, bot_user_id: &str, user_cache_ttl: Duration) -> Option<Mutation> {
    let event = payload.get("event")?;
    let event_type = event.get("type")?.as_str()?;
    let event_user = event.get("user").and_then(Value::as_str);

    match event_type {
        "member_joined_channel" if event_user == Some(bot_user_id) => {
            let channel = event.get("channel")?.as_str()?.to_string();
            Some(Mutation::JoinChannel(channel))
        }
        "member_left_channel" if event_user == Some(bot_user_id) => {
            let channel = event.get("channel")?.as_str()?.to_string();
            Some(Mutation::LeaveChannel(channel))
        }
        "user_change" | "team_join" => {
            let user = event.get("user")?;
            let id = user.get("id")?.as_str()?.to_string();
            let expires_at_ms = crate::shared::time::now_wall_ms() + user_cache_ttl.as_millis() as i64;
            Some(Mutation::PutUser {
                id,
                data: user.clone(),
                expires_at_ms,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn bots_own_channel_join_produces_join_mutation() {
        let payload = json!({
            "event": {"type": "member_joined_channel", "channel": "C1", "user": "UBOT"}
        });
        assert!(matches!(
            mutation_for_event(&payload, "UBOT", TTL),
            Some(Mutation::JoinChannel(c)) if c == "C1"
        ));
    }

    #[test]
    fn other_members_channel_join_is_ignored() {
        let payload = json!({
            "event": {"type": "member_joined_channel", "channel": "C1", "user": "USOMEONE"}
        });
        assert!(mutation_for_event(&payload, "UBOT", TTL).is_none());
    }

    #[test]
    fn bots_own_channel_leave_produces_leave_mutation() {
        let payload = json!({
            "event": {"type": "member_left_channel", "channel": "C1", "user": "UBOT"}
        });
        assert!(matches!(
            mutation_for_event(&payload, "UBOT", TTL),
            Some(Mutation::LeaveChannel(c)) if c == "C1"
        ));
    }

    #[test]
    fn user_change_and_team_join_produce_put_user() {
        for event_type in ["user_change", "team_join"] {
            let payload = json!({
                "event": {"type": event_type, "user": {"id": "U9", "name": "nine"}}
            });
            match mutation_for_event(&payload, "UBOT", TTL) {
                Some(Mutation::PutUser { id, data, .. }) => {
                    assert_eq!(id, "U9");
                    assert_eq!(data["name"], "nine");
                }
                other => panic!("expected PutUser, got {other:?}"),
            }
        }
    }

    #[test]
    fn unrelated_event_types_produce_no_mutation() {
        let payload = json!({"event": {"type": "message", "text": "hi"}});
        assert!(mutation_for_event(&payload, "UBOT", TTL).is_none());
    }
}
