#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod resolver;
pub mod version;

pub use config::{Config, OptimizeDepsConfig, ResolveConfig};
pub use error::{ConfigError, ResolveError};
pub use resolver::{
    DepsOptimizer, DepsRegistry, PackageCache, PackageData, ResolveContext, ResolveFlags,
    ResolvedModule, Resolver,
};
pub use version::VERSION;
