//! Modifiers that can be baked into a command template

use std::any::Any;
use std::fmt;

use crate::env::{ClearEnv, Env};
use crate::error::{Error, Result};
use crate::opts::Opts;

/// One configuration step applied to a command template
#[derive(Debug, Clone)]
pub enum Modifier {
    /// Append an argument
    Arg(String),
    /// Merge an environment overlay
    Env(Env),
    /// Empty the environment
    ClearEnv,
    /// Overlay execution options
    Opts(Opts),
}

impl Modifier {
    /// Classify a dynamically typed value.
    ///
    /// Strings become arguments; [`Env`], [`ClearEnv`] and [`Opts`] map to
    /// their modifiers. Anything else is rejected immediately.
    pub fn from_value<T: Any + fmt::Debug>(value: T) -> Result<Self> {
        let type_name = std::any::type_name::<T>();
        let repr = format!("{value:?}");
        let value: Box<dyn Any> = Box::new(value);
        let value = match value.downcast::<Modifier>() {
            Ok(modifier) => return Ok(*modifier),
            Err(value) => value,
        };
        let value = match value.downcast::<String>() {
            Ok(arg) => return Ok(Modifier::Arg(*arg)),
            Err(value) => value,
        };
        let value = match value.downcast::<&'static str>() {
            Ok(arg) => return Ok(Modifier::Arg((*arg).to_string())),
            Err(value) => value,
        };
        let value = match value.downcast::<Env>() {
            Ok(env) => return Ok(Modifier::Env(*env)),
            Err(value) => value,
        };
        let value = match value.downcast::<ClearEnv>() {
            Ok(_) => return Ok(Modifier::ClearEnv),
            Err(value) => value,
        };
        match value.downcast::<Opts>() {
            Ok(opts) => Ok(Modifier::Opts(*opts)),
            Err(_) => Err(Error::UnrecognizedModifier {
                type_name,
                value: repr,
            }),
        }
    }
}

impl From<&str> for Modifier {
    fn from(arg: &str) -> Self {
        Modifier::Arg(arg.to_string())
    }
}

impl From<String> for Modifier {
    fn from(arg: String) -> Self {
        Modifier::Arg(arg)
    }
}

impl From<Env> for Modifier {
    fn from(env: Env) -> Self {
        Modifier::Env(env)
    }
}

impl From<ClearEnv> for Modifier {
    fn from(_: ClearEnv) -> Self {
        Modifier::ClearEnv
    }
}

impl From<Opts> for Modifier {
    fn from(opts: Opts) -> Self {
        Modifier::Opts(opts)
    }
}
