//! Command-prefix scopes and subsystems.
//!
//! A [`Scope`] binds a command prefix such as `:CH2` or `:WAVeform` to the
//! instrument session. Subsystems are plain structs that hold a scope and
//! expose their properties as methods returning bound handles:
//!
//! ```no_run
//! use metrlib_scpi::property::ValueProperty;
//! use metrlib_scpi::subsystem::{Scope, Subsystem};
//! use metrlib_scpi::{ScpiConfig, ScpiInstrument};
//!
//! const LEVEL: ValueProperty = ValueProperty::new(":LEVel").range(-5.0, 5.0).units("V");
//!
//! struct Output {
//!     scope: Scope,
//! }
//!
//! impl Subsystem for Output {
//!     fn from_scope(scope: Scope) -> Self {
//!         Output { scope }
//!     }
//!     fn scope(&self) -> &Scope {
//!         &self.scope
//!     }
//! }
//!
//! impl Output {
//!     fn level(&self) -> metrlib_scpi::property::Value<'_> {
//!         self.scope.value(&LEVEL)
//!     }
//! }
//!
//! # async fn example(inst: ScpiInstrument) -> metrlib_core::Result<()> {
//! let outputs = Output::indexed(&inst.root(), ":OUTPut", 2)?;
//! outputs.channel(2)?.level().set(1.5).await?; // ":OUTPut2:LEVel 1.5V"
//! # Ok(())
//! # }
//! ```

use metrlib_core::error::{Error, Result};

use crate::instrument::ScpiInstrument;

/// A command prefix bound to an instrument session.
#[derive(Debug, Clone)]
pub struct Scope {
    instrument: ScpiInstrument,
    prefix: String,
}

impl Scope {
    pub fn new(instrument: ScpiInstrument, prefix: impl Into<String>) -> Self {
        Scope {
            instrument,
            prefix: prefix.into(),
        }
    }

    /// The full command prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn instrument(&self) -> &ScpiInstrument {
        &self.instrument
    }

    /// A nested scope. Prefixes concatenate verbatim: `":CH"` under `""`
    /// with index 2 is `":CH2"`, `":FREQ"` under that is `":CH2:FREQ"`.
    pub fn child(&self, prefix: &str, index: Option<usize>) -> Scope {
        let prefix = match index {
            Some(n) => format!("{}{prefix}{n}", self.prefix),
            None => format!("{}{prefix}", self.prefix),
        };
        Scope {
            instrument: self.instrument.clone(),
            prefix,
        }
    }

    /// `suffix` appended to this scope's prefix.
    pub fn command(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    /// Write a command relative to this scope.
    pub async fn write(&self, suffix: &str) -> Result<Option<String>> {
        self.instrument.write(&self.command(suffix)).await
    }

    /// Query a command relative to this scope. `suffix` carries its own `?`.
    pub async fn query(&self, suffix: &str) -> Result<String> {
        self.instrument.query(&self.command(suffix)).await
    }
}

/// A named command-prefix scope with properties.
///
/// Implementors supply [`from_scope`](Subsystem::from_scope) and
/// [`scope`](Subsystem::scope); construction helpers are provided.
pub trait Subsystem: Sized {
    fn from_scope(scope: Scope) -> Self;

    fn scope(&self) -> &Scope;

    /// Build one instance for `indices == 1`, or `indices` instances bound
    /// to `<prefix>1 ..= <prefix>N` otherwise.
    ///
    /// `indices == 0` is [`Error::InvalidParameter`].
    fn build(parent: &Scope, prefix: &str, indices: usize) -> Result<Built<Self>> {
        match indices {
            0 => Err(Error::InvalidParameter(format!(
                "subsystem '{prefix}' needs at least one index"
            ))),
            1 => Ok(Built::Single(Self::single(parent, prefix))),
            n => Self::indexed(parent, prefix, n).map(Built::Indexed),
        }
    }

    /// One instance bound to `prefix` without an index.
    fn single(parent: &Scope, prefix: &str) -> Self {
        Self::from_scope(parent.child(prefix, None))
    }

    /// `count` instances bound to `<prefix>1 ..= <prefix>count`, numbered
    /// even when `count == 1`.
    fn indexed(parent: &Scope, prefix: &str, count: usize) -> Result<Indexed<Self>> {
        if count == 0 {
            return Err(Error::InvalidParameter(format!(
                "subsystem '{prefix}' needs at least one index"
            )));
        }
        let items = (1..=count)
            .map(|n| Self::from_scope(parent.child(prefix, Some(n))))
            .collect();
        Ok(Indexed { items })
    }
}

/// The result of [`Subsystem::build`].
#[derive(Debug)]
pub enum Built<S> {
    Single(S),
    Indexed(Indexed<S>),
}

impl<S> Built<S> {
    /// The single instance, or `None` for an indexed build.
    pub fn into_single(self) -> Option<S> {
        match self {
            Built::Single(s) => Some(s),
            Built::Indexed(_) => None,
        }
    }

    /// The indexed container, or `None` for a single build.
    pub fn into_indexed(self) -> Option<Indexed<S>> {
        match self {
            Built::Indexed(items) => Some(items),
            Built::Single(_) => None,
        }
    }
}

/// Replicated subsystem instances addressed by 1-based index.
#[derive(Debug)]
pub struct Indexed<S> {
    items: Vec<S>,
}

impl<S> Indexed<S> {
    /// Instance `n` (1-based).
    pub fn get(&self, n: usize) -> Option<&S> {
        n.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Instance `n` (1-based), or [`Error::InvalidParameter`] when out of
    /// range.
    pub fn channel(&self, n: usize) -> Result<&S> {
        self.get(n).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "index {n} out of range 1..={}",
                self.items.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Instances in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.items.iter()
    }
}

impl<'a, S> IntoIterator for &'a Indexed<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
