use super::serde_ext::parse_via_string;
use serde::{Deserialize, Deserializer, Serialize};

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-', '_' or '.'"
    ))
}

macro_rules! define_id_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                validate_identifier_value($kind, raw)?;
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self("default".to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                parse_via_string(deserializer, $kind, |raw| {
                    validate_identifier_value($kind, raw).map(|_| raw.to_string())
                })
                .map(Self)
            }
        }
    };
}

// Namespaces event-buffer and diagnostics state per running bot instance.
// Two instances with distinct names share no dedupe state (event buffer
// namespace isolation invariant).
define_id_type!(InstanceName, "instance name");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_exotic_characters() {
        assert!(InstanceName::parse("").is_err());
        assert!(InstanceName::parse("prod bot").is_err());
        assert!(InstanceName::parse("prod.bot-1_east").is_ok());
    }
}
