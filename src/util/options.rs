use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::ConfigError;
use crate::mutator::{EvaluationMode, ProbabilityEntries, ProbabilityTable};
use crate::util::constants::DEFAULT_STRESS_FACTOR;

/// The built-in collectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, EnumIter, Display, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum PlanSelector {
    NoGC,
    MarkSweep,
    SemiSpace,
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Harness options.
        ///
        /// [`Options::default`] starts from the built-in defaults and then applies every
        /// `GC_HARNESS_<NAME>` environment variable that names an option, such as
        /// `GC_HARNESS_PLAN=MarkSweep` or `GC_HARNESS_STRESS_FACTOR=65536`.
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Set an option by its snake_case name. Returns whether the value was accepted;
            /// a rejected value leaves the option unchanged.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling process()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cannot parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// The options with their built-in defaults, ignoring the environment.
            pub fn builtin() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Apply every `<prefix><NAME>` variable from the environment.
            pub fn read_env_var_settings(&mut self, prefix: &str) {
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(prefix) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options::builtin();
                // If we have env vars that start with GC_HARNESS_ and match any option (such as
                // GC_HARNESS_STRESS_FACTOR), we set the option to its value (if it is a valid value).
                options.read_env_var_settings(ENV_PREFIX);
                options
            }
        }
    ]
}

/// Prefix of the environment variables [`Options::default`] reads.
pub const ENV_PREFIX: &str = "GC_HARNESS_";

options! {
    // The collector to drive.
    plan:          PlanSelector       [always_valid] = PlanSelector::NoGC,
    // Seed for the type generator and the mutator.
    seed:          u64                [always_valid] = 0x5eed_f00d,
    // Number of object layouts, the header included. Allocation picks from 1..type_count.
    type_count:    usize              [|v: &usize| *v >= 2] = 1000,
    // Fields per generated type are drawn from 0..max_fields.
    max_fields:    usize              [|v: &usize| *v > 0] = 40,
    // Mutator steps to run. 0 runs until the process is stopped.
    steps:         u64                [always_valid] = 100_000,
    // How frequent (every X bytes) should a plan do a stress GC? 0 disables stress GCs.
    stress_factor: usize              [always_valid] = DEFAULT_STRESS_FACTOR,
    // How the probability table turns percentages into actions.
    mode:          EvaluationMode     [always_valid] = EvaluationMode::Sequence,
    // Probability table entries. Empty selects the built-in table for the mode.
    probabilities: ProbabilityEntries [|v: &ProbabilityEntries| v.validate().is_ok()] = ProbabilityEntries::default(),
}

impl Options {
    /// The probability table the mutator should use.
    pub fn probability_table(&self) -> Result<ProbabilityTable, ConfigError> {
        if self.probabilities.is_empty() {
            return Ok(ProbabilityTable::preset(self.mode));
        }
        ProbabilityTable::new(self.mode, self.probabilities.to_vec())
    }

    /// Parse a whole `NAME=value` list separated by whitespace, as the driver accepts on its
    /// command line. Returns the names that were rejected.
    pub fn apply_arguments<'a, I>(&mut self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut rejected = vec![];
        for arg in args {
            let accepted = match arg.split_once('=') {
                Some((name, value)) => {
                    self.set_from_str(&name.trim_start_matches("--").replace('-', "_"), value)
                }
                None => false,
            };
            if !accepted {
                rejected.push(arg.to_string());
            }
        }
        rejected
    }
}

impl FromStr for Options {
    type Err = String;

    /// Builtin defaults overridden by a whitespace separated `name=value` list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = Options::builtin();
        let rejected = options.apply_arguments(s.split_whitespace());
        if rejected.is_empty() {
            Ok(options)
        } else {
            Err(format!("rejected options: {}", rejected.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{serial_test, with_cleanup};

    #[test]
    fn no_env_var() {
        serial_test(|| {
            let options = Options::default();
            assert_eq!(options.stress_factor, DEFAULT_STRESS_FACTOR);
            assert_eq!(options.type_count, 1000);
        })
    }

    #[test]
    fn with_valid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("GC_HARNESS_STRESS_FACTOR", "4096");

                    let options = Options::default();
                    assert_eq!(options.stress_factor, 4096);
                },
                || {
                    std::env::remove_var("GC_HARNESS_STRESS_FACTOR");
                },
            )
        })
    }

    #[test]
    fn with_multiple_valid_env_vars() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("GC_HARNESS_PLAN", "marksweep");
                    std::env::set_var("GC_HARNESS_MODE", "Override");

                    let options = Options::default();
                    assert_eq!(options.plan, PlanSelector::MarkSweep);
                    assert_eq!(options.mode, EvaluationMode::Override);
                },
                || {
                    std::env::remove_var("GC_HARNESS_PLAN");
                    std::env::remove_var("GC_HARNESS_MODE");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_value() {
        serial_test(|| {
            with_cleanup(
                || {
                    // invalid value, we cannot parse the value, so use the default value
                    std::env::set_var("GC_HARNESS_STRESS_FACTOR", "abc");
                    // parses, but fails validation
                    std::env::set_var("GC_HARNESS_TYPE_COUNT", "1");

                    let options = Options::default();
                    assert_eq!(options.stress_factor, DEFAULT_STRESS_FACTOR);
                    assert_eq!(options.type_count, 1000);
                },
                || {
                    std::env::remove_var("GC_HARNESS_STRESS_FACTOR");
                    std::env::remove_var("GC_HARNESS_TYPE_COUNT");
                },
            )
        })
    }

    #[test]
    fn with_probabilities_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var(
                        "GC_HARNESS_PROBABILITIES",
                        "0:10,0,50,5,5,5,20,5,0;64:0,40,50,5,5,5,20,5,0",
                    );

                    let options = Options::default();
                    assert_eq!(options.probabilities.len(), 2);
                    let table = options.probability_table().unwrap();
                    assert_eq!(table.entries().len(), 2);
                },
                || {
                    std::env::remove_var("GC_HARNESS_PROBABILITIES");
                },
            )
        })
    }

    #[test]
    fn set_from_str_rejects_unknown_names() {
        let mut options = Options::builtin();
        assert!(!options.set_from_str("no_such_option", "1"));
        assert!(options.set_from_str("seed", "17"));
        assert_eq!(options.seed, 17);
    }

    #[test]
    fn parse_argument_list() {
        let options: Options = "plan=SemiSpace --stress-factor=0 steps=10".parse().unwrap();
        assert_eq!(options.plan, PlanSelector::SemiSpace);
        assert_eq!(options.stress_factor, 0);
        assert_eq!(options.steps, 10);

        assert!("plan=Reference".parse::<Options>().is_err());
        assert!("max_fields=0".parse::<Options>().is_err());
    }

    #[test]
    fn default_table_follows_mode() {
        let mut options = Options::builtin();
        options.mode = EvaluationMode::Flat;
        assert_eq!(
            options.probability_table().unwrap(),
            ProbabilityTable::preset(EvaluationMode::Flat)
        );
    }
}
