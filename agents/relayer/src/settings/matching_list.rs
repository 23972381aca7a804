use std::{
    fmt,
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};

use relayer_core::{vaa::parse_emitter_address, ChainId, KnownChain, H256};
use serde::{
    de::{Error, SeqAccess, Visitor},
    Deserialize, Deserializer,
};

/// Defines a set of patterns for determining if a VAA should or should not
/// be relayed.
///
/// Valid options for each of the rule fields are
/// - wildcard "*"
/// - single value: a chain id or chain name, a hex emitter address, a payload
///   type name
/// - list of values
#[derive(Debug, Default, Clone)]
pub struct MatchingList(pub Option<Vec<ListElement>>);

#[derive(Debug, Clone, PartialEq)]
pub enum Filter<T> {
    Wildcard,
    Enumerated(Vec<T>),
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self::Wildcard
    }
}

impl<T: PartialEq> Filter<T> {
    fn matches(&self, v: &T) -> bool {
        match self {
            Filter::Wildcard => true,
            Filter::Enumerated(list) => list.iter().any(|i| i == v),
        }
    }
}

impl<T: Debug> Display for Filter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "*"),
            Self::Enumerated(l) if l.len() == 1 => write!(f, "{:?}", l[0]),
            Self::Enumerated(l) => {
                write!(f, "[")?;
                for i in l {
                    write!(f, "{i:?},")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A value a filter can enumerate.
pub trait FilterValue: Sized {
    /// Description used in deserialization errors
    const EXPECTING: &'static str;

    /// Parse a textual value
    fn from_str_value(v: &str) -> Result<Self, String>;

    /// Parse a numeric value
    fn from_u64_value(v: u64) -> Result<Self, String> {
        Self::from_str_value(&v.to_string())
    }
}

impl FilterValue for ChainId {
    const EXPECTING: &'static str = "a chain id or chain name";

    fn from_str_value(v: &str) -> Result<Self, String> {
        v.parse::<ChainId>()
            .or_else(|_| KnownChain::from_str(v).map(|c| c.id()))
            .map_err(|_| format!("Unknown chain `{v}`"))
    }

    fn from_u64_value(v: u64) -> Result<Self, String> {
        ChainId::try_from(v).map_err(|_| "Chain id must fit within a u16 value".to_owned())
    }
}

impl FilterValue for H256 {
    const EXPECTING: &'static str = "a hex emitter address";

    fn from_str_value(v: &str) -> Result<Self, String> {
        parse_emitter_address(v).ok_or_else(|| format!("Invalid emitter address `{v}`"))
    }
}

impl FilterValue for String {
    const EXPECTING: &'static str = "a payload type name";

    fn from_str_value(v: &str) -> Result<Self, String> {
        Ok(v.to_owned())
    }
}

struct MatchingListVisitor;
impl<'de> Visitor<'de> for MatchingListVisitor {
    type Value = MatchingList;

    fn expecting(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "an optional list of matching rules")
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(MatchingList(None))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(MatchingList(None))
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list: Vec<ListElement> = Vec::deserialize(deserializer)?;
        Ok(if list.is_empty() {
            // an empty list behaves as if no list was configured
            MatchingList(None)
        } else {
            MatchingList(Some(list))
        })
    }
}

struct FilterVisitor<T>(PhantomData<T>);
impl<'de, T: FilterValue> Visitor<'de> for FilterVisitor<T> {
    type Value = Filter<T>;

    fn expecting(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "a wildcard \"*\", {} or a list of them", T::EXPECTING)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(Filter::Enumerated(vec![T::from_u64_value(v).map_err(E::custom)?]))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(if v == "*" {
            Filter::Wildcard
        } else {
            Filter::Enumerated(vec![T::from_str_value(v).map_err(E::custom)?])
        })
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some(v) = seq.next_element::<serde_json::Value>()? {
            let value = match v {
                serde_json::Value::Number(n) => n
                    .as_u64()
                    .ok_or_else(|| A::Error::custom("Expected an unsigned integer"))
                    .and_then(|n| T::from_u64_value(n).map_err(A::Error::custom))?,
                serde_json::Value::String(s) => T::from_str_value(&s).map_err(A::Error::custom)?,
                other => return Err(A::Error::custom(format!("Unexpected filter value {other}"))),
            };
            values.push(value);
        }
        Ok(Filter::Enumerated(values))
    }
}

impl<'de> Deserialize<'de> for MatchingList {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_option(MatchingListVisitor)
    }
}

impl<'de, T: FilterValue> Deserialize<'de> for Filter<T> {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(FilterVisitor::<T>(PhantomData))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ListElement {
    #[serde(default, rename = "emitterchain", alias = "emitterChain")]
    emitter_chain: Filter<ChainId>,
    #[serde(default, rename = "emitteraddress", alias = "emitterAddress")]
    emitter_address: Filter<H256>,
    #[serde(default, rename = "targetchain", alias = "targetChain")]
    target_chain: Filter<ChainId>,
    #[serde(default, rename = "payloadtype", alias = "payloadType")]
    payload_type: Filter<String>,
}

impl Display for ListElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{emitterChain: {}, emitterAddress: {}, targetChain: {}, payloadType: {}}}",
            self.emitter_chain, self.emitter_address, self.target_chain, self.payload_type
        )
    }
}

/// The parts of a VAA a rule can look at.
#[derive(Clone, Copy, Debug)]
pub struct MatchInfo<'a> {
    pub emitter_chain: ChainId,
    pub emitter_address: &'a H256,
    pub target_chain: ChainId,
    pub payload_type: &'a str,
}

impl MatchingList {
    /// Check if a VAA matches any of the rules.
    /// - `default`: What to return if the matching list is empty.
    pub fn matches(&self, info: &MatchInfo, default: bool) -> bool {
        if let Some(rules) = &self.0 {
            matches_any_rule(rules.iter(), info)
        } else {
            default
        }
    }
}

fn matches_any_rule<'a>(
    mut rules: impl Iterator<Item = &'a ListElement>,
    info: &MatchInfo,
) -> bool {
    rules.any(|rule| {
        rule.emitter_chain.matches(&info.emitter_chain)
            && rule.emitter_address.matches(info.emitter_address)
            && rule.target_chain.matches(&info.target_chain)
            && rule.payload_type.matches(&info.payload_type.to_owned())
    })
}

impl Display for MatchingList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(wl) = &self.0 {
            write!(f, "[")?;
            for i in wl {
                write!(f, "{i},")?;
            }
            write!(f, "]")
        } else {
            write!(f, "null")
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Filter::*, *};

    fn info<'a>(emitter: &'a H256, payload_type: &'a str) -> MatchInfo<'a> {
        MatchInfo {
            emitter_chain: 2,
            emitter_address: emitter,
            target_chain: 255,
            payload_type,
        }
    }

    #[test]
    fn basic_config() {
        let list: MatchingList = serde_json::from_str(
            r#"[{"emitterchain": "*", "emitteraddress": "*", "targetchain": "*", "payloadtype": "*"}, {}]"#,
        )
        .unwrap();
        let rules = list.0.as_ref().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].emitter_chain, Wildcard);
        assert_eq!(rules[1].payload_type, Wildcard);

        assert!(list.matches(&info(&H256::zero(), "TransferToken"), false));
    }

    #[test]
    fn enumerated_values() {
        let list: MatchingList = serde_json::from_str(
            r#"[{"emitterChain": ["ethereum", 4], "targetchain": 255, "payloadtype": "TransferToken", "emitteraddress": "0x3ee18b2214aff97000d974cf647e7c347e8fa585"}]"#,
        )
        .unwrap();
        let rule = &list.0.as_ref().unwrap()[0];
        assert_eq!(rule.emitter_chain, Enumerated(vec![2, 4]));
        assert_eq!(rule.target_chain, Enumerated(vec![255]));

        let emitter = parse_emitter_address("3ee18b2214aff97000d974cf647e7c347e8fa585").unwrap();
        assert!(list.matches(&info(&emitter, "TransferToken"), false));
        assert!(!list.matches(&info(&emitter, "AttestToken"), false));
        assert!(!list.matches(&info(&H256::zero(), "TransferToken"), false));
    }

    #[test]
    fn empty_list_uses_default() {
        let list: MatchingList = serde_json::from_str("[]").unwrap();
        assert!(list.0.is_none());
        assert!(list.matches(&info(&H256::zero(), "x"), true));
        assert!(!list.matches(&info(&H256::zero(), "x"), false));

        let list: MatchingList = serde_json::from_str("null").unwrap();
        assert!(list.0.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(serde_json::from_str::<MatchingList>(r#"[{"emitterchain": "atlantis"}]"#).is_err());
        assert!(serde_json::from_str::<MatchingList>(r#"[{"emitterchain": 70000}]"#).is_err());
        assert!(serde_json::from_str::<MatchingList>(r#"[{"emitteraddress": "zz"}]"#).is_err());
    }
}
