use governor::Quota;
use std::num::NonZeroU32;

/// Slack's published Web API tiers (§4.4). `ChatPostMessage` is its own
/// variant because it carries a per-workspace cap tighter than the generic
/// tiers, matching Slack's documented special case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    ChatPostMessage,
}

impl Tier {
    /// Steady-state quota for the tier's token bucket. Slack documents
    /// these as requests-per-minute; `governor::Quota` wants a
    /// replenishment interval, so we express each as "N per minute".
    pub fn quota(self) -> Quota {
        let per_minute = |n: u32| {
            Quota::per_minute(NonZeroU32::new(n).expect("tier rate must be nonzero"))
        };
        match self {
            Tier::Tier1 => per_minute(1),
            Tier::Tier2 => per_minute(20),
            Tier::Tier3 => per_minute(50),
            Tier::Tier4 => per_minute(100),
            Tier::ChatPostMessage => per_minute(60),
        }
    }
}

const TIER_REGISTRY: &[(&str, Tier)] = &[
    ("chat.postMessage", Tier::ChatPostMessage),
    ("chat.update", Tier::Tier3),
    ("chat.delete", Tier::Tier3),
    ("chat.scheduleMessage", Tier::Tier3),
    ("chat.deleteScheduledMessage", Tier::Tier3),
    ("chat.postEphemeral", Tier::Tier4),
    ("chat.getPermalink", Tier::Tier3),
    ("chat.meMessage", Tier::Tier3),
    ("conversations.list", Tier::Tier2),
    ("conversations.history", Tier::Tier3),
    ("conversations.info", Tier::Tier3),
    ("conversations.members", Tier::Tier3),
    ("conversations.replies", Tier::Tier3),
    ("conversations.join", Tier::Tier3),
    ("conversations.leave", Tier::Tier3),
    ("conversations.invite", Tier::Tier3),
    ("conversations.create", Tier::Tier2),
    ("conversations.setTopic", Tier::Tier3),
    ("conversations.setPurpose", Tier::Tier3),
    ("users.list", Tier::Tier2),
    ("users.info", Tier::Tier4),
    ("users.conversations", Tier::Tier3),
    ("users.lookupByEmail", Tier::Tier4),
    ("usergroups.list", Tier::Tier2),
    ("usergroups.users.list", Tier::Tier2),
    ("team.info", Tier::Tier3),
    ("auth.test", Tier::Tier4),
    ("apps.connections.open", Tier::Tier1),
    ("reactions.add", Tier::Tier3),
    ("reactions.remove", Tier::Tier3),
    ("reactions.get", Tier::Tier3),
    ("reactions.list", Tier::Tier2),
    ("pins.add", Tier::Tier3),
    ("pins.remove", Tier::Tier3),
    ("pins.list", Tier::Tier3),
    ("bots.info", Tier::Tier4),
    ("views.open", Tier::Tier4),
    ("views.update", Tier::Tier4),
    ("views.publish", Tier::Tier4),
    ("files.upload", Tier::Tier3),
    ("files.info", Tier::Tier4),
];

/// Falls back to `Tier3` (Slack's middle-of-the-road default) for methods
/// not in the registry, rather than failing outbound calls for undocumented
/// or newly added methods.
pub fn tier_for_method(method: &str) -> Tier {
    TIER_REGISTRY
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, tier)| *tier)
        .unwrap_or(Tier::Tier3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_method_resolves_documented_tier() {
        assert_eq!(tier_for_method("chat.postMessage"), Tier::ChatPostMessage);
        assert_eq!(tier_for_method("users.list"), Tier::Tier2);
    }

    #[test]
    fn unknown_method_falls_back_to_tier3() {
        assert_eq!(tier_for_method("some.new.method"), Tier::Tier3);
    }
}
