//! Live (non-persistent) upstream state (§3): registration phase, negotiated
//! caps, ISUPPORT tokens, and per-channel membership.

use std::collections::HashMap;
use std::time::Instant;

/// Phase of the upstream connection's lifecycle (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamPhase {
    Disconnected,
    Dialing,
    Registering,
    Connected,
    Closing,
}

/// The chosen ISUPPORT CASEMAPPING (§4.4 step 5), used for every
/// channel/nick comparison from registration onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMap {
    #[default]
    Rfc1459,
    Ascii,
    Rfc7613,
}

impl CaseMap {
    pub fn parse(s: &str) -> Self {
        match s {
            "ascii" => CaseMap::Ascii,
            "rfc7613" => CaseMap::Rfc7613,
            _ => CaseMap::Rfc1459,
        }
    }

    pub fn eq(&self, a: &str, b: &str) -> bool {
        match self {
            CaseMap::Rfc1459 => slirc_proto::casemap::irc_eq(a, b),
            CaseMap::Ascii => a.eq_ignore_ascii_case(b),
            CaseMap::Rfc7613 => a == b,
        }
    }

    pub fn to_lower(&self, s: &str) -> String {
        match self {
            CaseMap::Rfc1459 => slirc_proto::casemap::irc_to_lower(s),
            CaseMap::Ascii => s.to_ascii_lowercase(),
            CaseMap::Rfc7613 => s.to_string(),
        }
    }
}

/// Ingested ISUPPORT tokens this crate acts on (§4.4 step 5).
#[derive(Debug, Clone, Default)]
pub struct IsupportState {
    pub casemapping: CaseMap,
    pub chantypes: String,
    pub network: Option<String>,
    /// `(mode, prefix)` pairs, highest privilege first, from `PREFIX=(modes)prefixes`.
    pub prefix: Vec<(char, char)>,
}

impl IsupportState {
    /// Fold in one `RPL_ISUPPORT` line's tokens. Later tokens override
    /// earlier ones, matching how real servers split ISUPPORT across lines.
    pub fn ingest(&mut self, isupport: &slirc_proto::Isupport<'_>) {
        if let Some(cm) = isupport.casemapping() {
            self.casemapping = CaseMap::parse(cm);
        }
        if let Some(ct) = isupport.chantypes() {
            self.chantypes = ct.to_string();
        }
        if let Some(net) = isupport.network() {
            self.network = Some(net.to_string());
        }
        if let Some(spec) = isupport.prefix() {
            self.prefix = spec.modes.chars().zip(spec.prefixes.chars()).collect();
        }
    }

    pub fn is_channel(&self, target: &str) -> bool {
        if self.chantypes.is_empty() {
            return target.starts_with('#') || target.starts_with('&');
        }
        target
            .chars()
            .next()
            .map(|c| self.chantypes.contains(c))
            .unwrap_or(false)
    }

    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        self.prefix.iter().find(|(m, _)| *m == mode).map(|(_, p)| *p)
    }
}

/// Live state of one joined channel, mirrored from upstream traffic.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub topic: Option<String>,
    /// Nick (casemapped form as seen on the wire) → membership prefix modes.
    pub members: HashMap<String, Vec<char>>,
    pub last_activity: Option<Instant>,
}

/// Everything C4 tracks about one connected upstream (§3, "Live upstream state").
#[derive(Debug, Clone, Default)]
pub struct LiveUpstreamState {
    pub nick: String,
    pub isupport: IsupportState,
    pub channels: HashMap<String, ChannelState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isupport_from(line: &str) -> slirc_proto::Isupport<'static> {
        let params: Vec<&'static str> = Box::leak(
            line.split_whitespace()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        )
        .iter()
        .map(|s| s.as_str())
        .collect();
        slirc_proto::isupport::parse_params(&params)
    }

    #[test]
    fn ingest_casemapping_chantypes_and_prefix() {
        let mut state = IsupportState::default();
        state.ingest(&isupport_from("CASEMAPPING=ascii CHANTYPES=# PREFIX=(ov)@+"));
        assert_eq!(state.casemapping, CaseMap::Ascii);
        assert_eq!(state.chantypes, "#");
        assert_eq!(state.prefix, vec![('o', '@'), ('v', '+')]);
        assert!(state.is_channel("#rust"));
        assert!(!state.is_channel("rust"));
        assert_eq!(state.prefix_for_mode('o'), Some('@'));
    }

    #[test]
    fn later_isupport_line_overrides_earlier_token() {
        let mut state = IsupportState::default();
        state.ingest(&isupport_from("CASEMAPPING=rfc1459"));
        state.ingest(&isupport_from("CASEMAPPING=rfc7613"));
        assert_eq!(state.casemapping, CaseMap::Rfc7613);
    }

    #[test]
    fn default_casemapping_is_rfc1459_style_folding() {
        let state = IsupportState::default();
        assert!(state.casemapping.eq("Foo[bar]", "foo{bar}"));
    }
}
