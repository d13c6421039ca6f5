//! Configuration for the block terms dictionary format.
//!
//! The configuration picks which terms index sits next to the dictionary and
//! how densely it samples terms. It is chosen once when a
//! [`BlockTermsFormat`](crate::format::BlockTermsFormat) is built and applies
//! to every segment written with that format.
//!
//! # Example
//!
//! ```
//! use blockterms::config::{BlockTermsConfig, IndexTermPolicy, TermIndexConfig};
//!
//! // Default: fixed gap index, one sample every 32 terms
//! let config = BlockTermsConfig::default();
//! assert_eq!(config.term_index.index_type_name(), "FixedGap");
//!
//! // Variable gap index that also samples very frequent terms
//! let config = BlockTermsConfig {
//!     term_index: TermIndexConfig::VariableGap {
//!         policy: IndexTermPolicy::EveryNOrDocFreq {
//!             interval: 64,
//!             doc_freq_threshold: 1000,
//!         },
//!     },
//! };
//! config.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{BlockTermsError, Result};
use crate::util::packed;

/// Default number of terms between two index samples.
pub const DEFAULT_TERM_INDEX_INTERVAL: u32 = 32;

/// Configuration of a block terms dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockTermsConfig {
    /// Which terms index to build next to the dictionary.
    #[serde(default)]
    pub term_index: TermIndexConfig,
}

/// Terms index selection.
///
/// - **FixedGap**: every Nth term is sampled into packed arrays. Supports
///   seeking by ordinal.
/// - **VariableGap**: a policy picks the samples, which are stored in an
///   FST. Usually smaller on disk; no ordinals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TermIndexConfig {
    /// Fixed interval, array based index.
    FixedGap {
        /// Terms between two samples.
        interval: u32,
        /// Values per block in the packed address arrays.
        #[serde(default = "default_packed_block_size")]
        packed_block_size: u32,
    },
    /// Policy driven, FST based index.
    VariableGap {
        /// Which terms become samples.
        policy: IndexTermPolicy,
    },
}

fn default_packed_block_size() -> u32 {
    packed::DEFAULT_BLOCK_SIZE
}

impl Default for TermIndexConfig {
    fn default() -> Self {
        TermIndexConfig::FixedGap {
            interval: DEFAULT_TERM_INDEX_INTERVAL,
            packed_block_size: packed::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl TermIndexConfig {
    /// Get a human-readable name for the index type.
    pub fn index_type_name(&self) -> &str {
        match self {
            TermIndexConfig::FixedGap { .. } => "FixedGap",
            TermIndexConfig::VariableGap { .. } => "VariableGap",
        }
    }

    /// Whether the configured index supports seeking by ordinal.
    pub fn supports_ord(&self) -> bool {
        matches!(self, TermIndexConfig::FixedGap { .. })
    }
}

/// Selection policy of the variable gap index.
///
/// Whatever the policy, the first term of every field is always sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IndexTermPolicy {
    /// Sample every Nth term.
    EveryN {
        /// Terms between two samples.
        interval: u32,
    },
    /// Sample every Nth term, and every term whose doc freq reaches the
    /// threshold.
    EveryNOrDocFreq {
        /// Terms between two samples.
        interval: u32,
        /// Doc freq at or above which a term is always sampled.
        doc_freq_threshold: u32,
    },
}

impl Default for IndexTermPolicy {
    fn default() -> Self {
        IndexTermPolicy::EveryN {
            interval: DEFAULT_TERM_INDEX_INTERVAL,
        }
    }
}

impl BlockTermsConfig {
    /// Fixed gap index with the given interval.
    pub fn fixed_gap(interval: u32) -> Self {
        BlockTermsConfig {
            term_index: TermIndexConfig::FixedGap {
                interval,
                packed_block_size: packed::DEFAULT_BLOCK_SIZE,
            },
        }
    }

    /// Variable gap index with the given policy.
    pub fn variable_gap(policy: IndexTermPolicy) -> Self {
        BlockTermsConfig {
            term_index: TermIndexConfig::VariableGap { policy },
        }
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        match &self.term_index {
            TermIndexConfig::FixedGap {
                interval,
                packed_block_size,
            } => {
                check_interval(*interval)?;
                packed::check_block_size(*packed_block_size).map_err(|_| {
                    BlockTermsError::invalid_config(format!(
                        "packed_block_size must be a power of two in {}..={}, got {packed_block_size}",
                        packed::MIN_BLOCK_SIZE,
                        packed::MAX_BLOCK_SIZE
                    ))
                })?;
            }
            TermIndexConfig::VariableGap { policy } => match policy {
                IndexTermPolicy::EveryN { interval } => check_interval(*interval)?,
                IndexTermPolicy::EveryNOrDocFreq {
                    interval,
                    doc_freq_threshold,
                } => {
                    check_interval(*interval)?;
                    if *doc_freq_threshold == 0 {
                        return Err(BlockTermsError::invalid_config(
                            "doc_freq_threshold must be >= 1",
                        ));
                    }
                }
            },
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BlockTermsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_interval(interval: u32) -> Result<()> {
    if interval == 0 {
        return Err(BlockTermsError::invalid_config("interval must be >= 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BlockTermsConfig::default();
        assert_eq!(config, BlockTermsConfig::fixed_gap(32));
        assert!(config.term_index.supports_ord());
        config.validate().unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let config = BlockTermsConfig::variable_gap(IndexTermPolicy::EveryNOrDocFreq {
            interval: 16,
            doc_freq_threshold: 500,
        });
        let json = config.to_json().unwrap();
        assert_eq!(BlockTermsConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_json() {
        let config = BlockTermsConfig::from_json(
            r#"{"term_index": {"type": "VariableGap", "policy": {"type": "EveryN", "interval": 8}}}"#,
        )
        .unwrap();
        assert_eq!(config.term_index.index_type_name(), "VariableGap");
        assert!(!config.term_index.supports_ord());

        let config =
            BlockTermsConfig::from_json(r#"{"term_index": {"type": "FixedGap", "interval": 4}}"#)
                .unwrap();
        assert_eq!(config, BlockTermsConfig::fixed_gap(4));

        let config = BlockTermsConfig::from_json("{}").unwrap();
        assert_eq!(config, BlockTermsConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        assert!(BlockTermsConfig::fixed_gap(0).validate().is_err());
        assert!(
            BlockTermsConfig::variable_gap(IndexTermPolicy::EveryN { interval: 0 })
                .validate()
                .is_err()
        );
        assert!(
            BlockTermsConfig::variable_gap(IndexTermPolicy::EveryNOrDocFreq {
                interval: 4,
                doc_freq_threshold: 0,
            })
            .validate()
            .is_err()
        );

        let config = BlockTermsConfig {
            term_index: TermIndexConfig::FixedGap {
                interval: 4,
                packed_block_size: 100,
            },
        };
        assert!(config.validate().is_err());

        assert!(matches!(
            BlockTermsConfig::from_json("not json"),
            Err(BlockTermsError::Json(_))
        ));
        assert!(matches!(
            BlockTermsConfig::from_json(r#"{"term_index": {"type": "FixedGap", "interval": 0}}"#),
            Err(BlockTermsError::InvalidArgument(_))
        ));
    }
}
