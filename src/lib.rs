//! Declarative observable property models.
//!
//! A [`ModelType`] declares state properties, which hold values, and computed properties,
//! which derive their values from other properties. Each [`Model`] of the type tracks which
//! properties its computed properties read, recomputes them when those properties change,
//! and publishes a change event for every property whose value changes.
//!
//! ```
//! use propflow::{ComputedSpec, Model, ModelConfig, ModelSpec, StateSpec};
//!
//! let ty = ModelSpec::<i32>::new()
//!     .state("a", StateSpec::new().init(1))
//!     .state("b", StateSpec::new().init(2))
//!     .computed(
//!         "sum",
//!         ComputedSpec::new(|m: &Model<i32>| Ok((m.get("a")? + m.get("b")?).into())),
//!     )
//!     .build()?;
//! let m = Model::new(&ty, ModelConfig::new())?;
//! assert_eq!(m.get("sum")?, 3);
//! m.set("a", 10)?;
//! assert_eq!(m.get("sum")?, 12);
//! # Ok::<(), propflow::Error>(())
//! ```

mod batch;
pub mod descriptor;
mod error;
mod event;
mod graph;
mod model;
mod runtime;
mod subscription;
mod utils;
mod value;

pub use batch::*;
pub use descriptor::{
    ComputedOptions, ComputedSpec, InitValue, ModelSpec, ModelType, ReadOnly,
    ReadOnlySetBehavior, StateOptions, StateSpec,
};
pub use error::*;
pub use event::*;
pub use graph::PropertyId;
pub use model::*;
pub use runtime::*;
pub use subscription::*;
pub use value::*;
