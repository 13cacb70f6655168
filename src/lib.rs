// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(dead_code)]                   // Unused code should be removed
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Keystone
//!
//! A declarative reconciliation engine for remote resources.
//!
//! ## Overview
//!
//! Keystone keeps a set of remote objects (events, plans, categories, ...) in
//! line with a declared graph of resources:
//!
//! - Resources reference each other's provider outputs through forward
//!   references that are resolved as the run progresses
//! - Changes are computed against the last applied state, not by querying
//!   the remote system
//! - Operations run concurrently, each as soon as its dependencies are done
//! - Existing remote objects with matching names can be imported instead of
//!   duplicated
//!
//! ## Architecture
//!
//! 1. **Target graph**: produced by a [`provider::Loader`]
//! 2. **Source graph**: rebuilt from [`state::State`]
//! 3. **Planner**: diffs the two and orders the operations
//! 4. **Executor**: runs operations against a [`provider::Provider`],
//!    recording each result in state
//!
//! ## Modules
//!
//! - [`graph`]: URNs, properties, references and the dependency graph
//! - [`planner`]: Diff, import matching and planning
//! - [`resolver`]: Reference resolution against state
//! - [`executor`]: Concurrent, dependency-aware execution
//! - [`syncer`]: One full run, from lock to saved state
//! - [`state`]: State model and storage backends
//! - [`config`]: Engine configuration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```json
//! {
//!   "resources": [
//!     { "type": "event", "id": "e1", "data": { "name": "Signup" } },
//!     { "type": "plan", "id": "p1", "data": { "name": "Pro" } },
//!     {
//!       "type": "trigger_plan", "id": "tp1",
//!       "data": {
//!         "event": { "$ref": "event:e1", "property": "id" },
//!         "plan": { "$ref": "plan:p1", "property": "id" }
//!       }
//!     }
//!   ]
//! }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod reporter;
pub mod resolver;
pub mod state;
pub mod syncer;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter, TerminalReporter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, EngineConfig};
pub use error::{KeystoneError, Result};
pub use executor::{ExecutionMode, ExecutionReport, Executor};
pub use graph::{Graph, PropertyRef, PropertyValue, Resource, ResourceData, Urn};
pub use planner::{Diff, Operation, OperationType, compute_diff, plan};
pub use provider::{Loader, Provider, StaticLoader};
pub use reporter::{NoopReporter, Reporter};
pub use resolver::ResolverRegistry;
pub use state::{LocalStateStore, State, StateStore};
pub use syncer::{ProjectSyncer, SyncOutcome, SyncStatus};
