//! Topic routing: dotted word patterns with `*` and `#` wildcards.
//!
//! - `*` matches exactly one word
//! - `#` matches zero or more words
//! - an empty routing key or binding key has zero words
//!
//! Patterns are compiled once per distinct binding key and cached; the cache
//! is reference counted through `on_bind`/`on_unbind`. Routing always works
//! from the binding snapshot and compiles on a cache miss, so a bind racing a
//! publish can never make a binding invisible to the matcher.

use super::{unique_destinations, validate_key_length, ExchangeType, RoutingStrategy};
use crate::binding::Binding;
use crate::error::{ExchangeError, Result};
use crate::message::InboundMessage;
use crate::DestinationRef;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

const WORD_SEPARATOR: char = '.';
const SINGLE_WORD: &str = "*";
const MULTI_WORD: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    /// `*`
    AnyWord,
    /// `#`
    AnyWords,
}

/// Compiled topic binding key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Compile a binding key; the error string explains why it is malformed
    pub fn parse(key: &str) -> std::result::Result<Self, String> {
        let mut segments: Vec<Segment> = Vec::new();
        if key.is_empty() {
            return Ok(Self { segments });
        }

        for (index, word) in key.split(WORD_SEPARATOR).enumerate() {
            let segment = match word {
                SINGLE_WORD => Segment::AnyWord,
                MULTI_WORD => Segment::AnyWords,
                _ if word.contains(['*', '#']) => {
                    return Err(format!(
                        "word {} ('{}') mixes a wildcard with other characters",
                        index, word
                    ));
                }
                _ => Segment::Word(word.to_string()),
            };

            // "#.#" matches exactly what "#" matches
            if segment == Segment::AnyWords && segments.last() == Some(&Segment::AnyWords) {
                continue;
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| !matches!(segment, Segment::Word(_)))
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = if routing_key.is_empty() {
            Vec::new()
        } else {
            routing_key.split(WORD_SEPARATOR).collect()
        };
        self.matches_words(&words)
    }

    /// Bottom-up table over (segment, word) suffixes; linear in
    /// segments x words regardless of how many `#` appear.
    fn matches_words(&self, words: &[&str]) -> bool {
        let word_count = words.len();

        // row for the empty pattern suffix: matches only the empty word suffix
        let mut next = vec![false; word_count + 1];
        next[word_count] = true;

        for segment in self.segments.iter().rev() {
            let mut current = vec![false; word_count + 1];
            for j in (0..=word_count).rev() {
                current[j] = match segment {
                    Segment::AnyWords => next[j] || (j < word_count && current[j + 1]),
                    Segment::AnyWord => j < word_count && next[j + 1],
                    Segment::Word(expected) => {
                        j < word_count && words[j] == expected && next[j + 1]
                    }
                };
            }
            next = current;
        }

        next[0]
    }
}

#[derive(Debug)]
struct CachedPattern {
    pattern: Arc<TopicPattern>,
    refs: usize,
}

#[derive(Debug, Default)]
pub struct TopicStrategy {
    patterns: DashMap<String, CachedPattern>,
}

impl TopicStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct binding keys with a compiled pattern
    pub fn cached_patterns(&self) -> usize {
        self.patterns.len()
    }

    fn pattern_for(&self, key: &str) -> Option<Arc<TopicPattern>> {
        if let Some(cached) = self.patterns.get(key) {
            return Some(cached.pattern.clone());
        }
        TopicPattern::parse(key).ok().map(Arc::new)
    }
}

impl RoutingStrategy for TopicStrategy {
    fn exchange_type(&self) -> ExchangeType {
        ExchangeType::Topic
    }

    fn validate_binding(&self, binding: &Binding) -> Result<()> {
        let key = binding.binding_key();
        validate_key_length(&ExchangeType::Topic, key)?;
        TopicPattern::parse(key)
            .map(|_| ())
            .map_err(|reason| ExchangeError::invalid_binding_key("topic", key, reason))
    }

    fn on_bind(&self, binding: &Binding) {
        let key = binding.binding_key();
        if let Some(mut cached) = self.patterns.get_mut(key) {
            cached.refs += 1;
            return;
        }
        let Ok(pattern) = TopicPattern::parse(key) else {
            return;
        };
        self.patterns
            .entry(key.to_string())
            .or_insert_with(|| CachedPattern {
                pattern: Arc::new(pattern),
                refs: 0,
            })
            .refs += 1;
    }

    fn on_unbind(&self, binding: &Binding) {
        let key = binding.binding_key();
        let now_unused = match self.patterns.get_mut(key) {
            Some(mut cached) => {
                cached.refs = cached.refs.saturating_sub(1);
                cached.refs == 0
            }
            None => false,
        };
        if now_unused {
            self.patterns.remove_if(key, |_, cached| cached.refs == 0);
        }
    }

    fn match_bindings(
        &self,
        bindings: &[Arc<Binding>],
        message: &dyn InboundMessage,
    ) -> Vec<DestinationRef> {
        let routing_key = message.routing_key();
        // many bindings usually share a key; evaluate each key once
        let mut verdicts: HashMap<&str, bool> = HashMap::new();
        let mut matched = Vec::new();

        for binding in bindings {
            let key = binding.binding_key();
            let hit = *verdicts.entry(key).or_insert_with(|| {
                self.pattern_for(key)
                    .map(|pattern| pattern.matches(routing_key))
                    .unwrap_or(false)
            });
            if hit {
                matched.push(binding);
            }
        }

        unique_destinations(matched)
    }
}
