//! Error routing for adapter failures.
//!
//! Every failure that reaches a phase boundary is matched against registered
//! error signatures (adapter error kind and a message pattern), each carrying
//! a max-occurrence policy. The most specific signature counts the failure;
//! once its count reaches the limit the session group is stopped instead of
//! collecting one more generic conflict. Counts live as long as the worker.

use regex::Regex;
use tandem_core::config::ErrorRoutingConfig;
use tandem_core::errors::{AdapterError, AdapterErrorKind, TandemError, TandemResult};

/// Failures that block a session on the first occurrence.
const INSTANTLY_BLOCKING: &[&str] = &[
    r"(?i)unauthori[sz]ed|access denied|permission denied",
    r"(?i)not enough space|disk full|no space left",
];

#[derive(Debug, Clone)]
pub struct ErrorSignature {
    kind: Option<AdapterErrorKind>,
    message: Option<Regex>,
}

impl ErrorSignature {
    /// Matches every adapter error.
    pub fn any() -> Self {
        Self {
            kind: None,
            message: None,
        }
    }

    pub fn of_kind(kind: AdapterErrorKind) -> Self {
        Self {
            kind: Some(kind),
            message: None,
        }
    }

    /// Also require the adapter message to match `pattern`.
    pub fn with_message(mut self, pattern: &str) -> TandemResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| TandemError::ConfigError(format!("error signature pattern '{pattern}': {e}")))?;
        self.message = Some(regex);
        Ok(self)
    }

    pub fn matches(&self, error: &AdapterError) -> bool {
        self.kind.map_or(true, |k| k == error.kind())
            && self.message.as_ref().map_or(true, |re| re.is_match(error.message()))
    }

    /// A message pattern outranks a kind.
    fn specificity(&self) -> u8 {
        u8::from(self.kind.is_some()) + 2 * u8::from(self.message.is_some())
    }

    pub fn describe(&self) -> String {
        let kind = self.kind.map_or("any", |k| k.as_str());
        match &self.message {
            Some(re) => format!("{kind} /{}/", re.as_str()),
            None => kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxOccurrencePolicy {
    pub max_occurrences: u32,
}

impl MaxOccurrencePolicy {
    pub fn new(max_occurrences: u32) -> Self {
        Self {
            max_occurrences: max_occurrences.max(1),
        }
    }
}

/// What to do with one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorRoute {
    /// Record it as a conflict and keep going.
    Conflict { occurrences: u32, limit: u32 },
    /// The signature reached its limit.
    StopSession {
        signature: String,
        occurrences: u32,
        limit: u32,
    },
}

#[derive(Debug)]
struct Registration {
    signature: ErrorSignature,
    policy: MaxOccurrencePolicy,
    occurrences: u32,
}

#[derive(Debug)]
pub struct ErrorRouter {
    registrations: Vec<Registration>,
}

impl ErrorRouter {
    /// Only the catch-all signature, limited to `default_max_occurrences`.
    pub fn new(default_max_occurrences: u32) -> Self {
        let mut router = Self {
            registrations: Vec::new(),
        };
        router.register(ErrorSignature::any(), MaxOccurrencePolicy::new(default_max_occurrences));
        router
    }

    /// Built-in signatures, then the configured ones.
    pub fn from_config(config: &ErrorRoutingConfig) -> TandemResult<Self> {
        let mut router = Self::new(config.default_max_occurrences);
        router.register(
            ErrorSignature::of_kind(AdapterErrorKind::Transient),
            MaxOccurrencePolicy::new(config.environmental_max_occurrences),
        );
        for pattern in INSTANTLY_BLOCKING {
            router.register(
                ErrorSignature::of_kind(AdapterErrorKind::Fatal).with_message(pattern)?,
                MaxOccurrencePolicy::new(1),
            );
        }
        for configured in &config.signatures {
            let signature = match configured.kind {
                Some(kind) => ErrorSignature::of_kind(kind),
                None => ErrorSignature::any(),
            };
            let signature = match &configured.message {
                Some(pattern) => signature.with_message(pattern)?,
                None => signature,
            };
            router.register(signature, MaxOccurrencePolicy::new(configured.max_occurrences));
        }
        Ok(router)
    }

    /// Among equally specific signatures the latest registration wins.
    pub fn register(&mut self, signature: ErrorSignature, policy: MaxOccurrencePolicy) {
        self.registrations.push(Registration {
            signature,
            policy,
            occurrences: 0,
        });
    }

    /// Count `error` against its signature and decide its route.
    pub fn route(&mut self, error: &AdapterError) -> ErrorRoute {
        let best = self
            .registrations
            .iter_mut()
            .enumerate()
            .filter(|(_, r)| r.signature.matches(error))
            .max_by_key(|(idx, r)| (r.signature.specificity(), *idx))
            .map(|(_, r)| r);
        let Some(registration) = best else {
            return ErrorRoute::Conflict {
                occurrences: 1,
                limit: u32::MAX,
            };
        };

        registration.occurrences = registration.occurrences.saturating_add(1);
        let occurrences = registration.occurrences;
        let limit = registration.policy.max_occurrences;
        if occurrences >= limit {
            ErrorRoute::StopSession {
                signature: registration.signature.describe(),
                occurrences,
                limit,
            }
        } else {
            ErrorRoute::Conflict { occurrences, limit }
        }
    }
}
