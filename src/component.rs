/*! Component contract.

Components are the units of the pipeline. Each one does one thing, and
the host framework wires them together with ports and drives them by
calling [`Component::process`] from its worker threads.

The lifecycle is `set_property`* → `initialize` → `start` →
`process`* → `stop`. `initialize` allocates plans, windows and rings and
is where configuration errors surface; `start`/`stop` bracket any
background threads a component runs. The same component's `process()` is
never re-entered concurrently by the host.
*/

use crate::{Error, Result};

/** Return type for all components.

This tells the scheduler whether the component made progress and how
soon it is worth calling again.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retval {
    /// Progress was made; the scheduler may yield.
    Normal,

    /// No input available; back off.
    Noop,

    /// Progress was made and more is immediately available; call again
    /// without yielding.
    NoYield,

    /// The component is done and will never produce again.
    ///
    /// This is a normal terminal return, not an error. Example: a
    /// capped file sink that has written its last byte.
    Finish,
}

/// A property value bound by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// String value.
    Str(String),

    /// U32 value.
    U32(u32),

    /// U64 value.
    U64(u64),

    /// F32 value.
    F32(f32),

    /// F64 value.
    F64(f64),

    /// Bool value.
    Bool(bool),
}

impl PropertyValue {
    /// Extract a string, or fail with a configuration error.
    pub fn into_string(self, name: &str) -> Result<String> {
        match self {
            PropertyValue::Str(s) => Ok(s),
            other => Err(Error::config(format!(
                "property {name}: expected string, got {other:?}"
            ))),
        }
    }

    /// Extract a u32.
    pub fn into_u32(self, name: &str) -> Result<u32> {
        match self {
            PropertyValue::U32(v) => Ok(v),
            other => Err(Error::config(format!(
                "property {name}: expected u32, got {other:?}"
            ))),
        }
    }

    /// Extract a u64. A u32 widens losslessly.
    pub fn into_u64(self, name: &str) -> Result<u64> {
        match self {
            PropertyValue::U64(v) => Ok(v),
            PropertyValue::U32(v) => Ok(u64::from(v)),
            other => Err(Error::config(format!(
                "property {name}: expected u64, got {other:?}"
            ))),
        }
    }

    /// Extract an f64. An f32 widens losslessly.
    pub fn into_f64(self, name: &str) -> Result<f64> {
        match self {
            PropertyValue::F64(v) => Ok(v),
            PropertyValue::F32(v) => Ok(f64::from(v)),
            other => Err(Error::config(format!(
                "property {name}: expected f64, got {other:?}"
            ))),
        }
    }

    /// Extract an f32.
    pub fn into_f32(self, name: &str) -> Result<f32> {
        match self {
            PropertyValue::F32(v) => Ok(v),
            other => Err(Error::config(format!(
                "property {name}: expected f32, got {other:?}"
            ))),
        }
    }

    /// Extract a bool.
    pub fn into_bool(self, name: &str) -> Result<bool> {
        match self {
            PropertyValue::Bool(v) => Ok(v),
            other => Err(Error::config(format!(
                "property {name}: expected bool, got {other:?}"
            ))),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.into())
    }
}
impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}
impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::U32(v)
    }
}
impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::U64(v)
    }
}
impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::F32(v)
    }
}
impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::F64(v)
    }
}
impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// Component trait, implemented by every pipeline unit.
pub trait Component: Send {
    /// Name of the component kind, e.g. `"udp_source"`.
    ///
    /// Not the name of an *instance*.
    fn name(&self) -> &str;

    /// Bind a named property. Called by the host before `initialize`.
    ///
    /// Unknown names and mistyped values are configuration errors.
    fn set_property(&mut self, name: &str, _value: PropertyValue) -> Result<()> {
        Err(Error::config(format!(
            "{}: unknown property {name}",
            self.name()
        )))
    }

    /// Allocate runtime resources: plans, windows, rings, sockets.
    ///
    /// Failure here is fatal for the component; it must not be started.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Spawn any background threads.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// One scheduler-driven work invocation.
    ///
    /// Callable only between `start` and `stop`. May block briefly on
    /// internal waits, all bounded at one second.
    fn process(&mut self) -> Result<Retval>;

    /// Request stop and join any background threads before returning.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/* vim: textwidth=80
 */
