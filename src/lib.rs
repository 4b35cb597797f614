//! MIND lowering core: registry-driven operator conversion with
//! shape-range propagation.
pub mod config;
pub mod conformance;
pub mod error;
pub mod graph;
pub mod lower;
pub mod ops;
pub mod pipeline;
pub mod shapes;
pub mod types;

pub use config::ConvertOptions;
pub use conformance::{ConformanceOptions, ConformanceProfile, DispatchCase};
pub use error::ConvertError;
pub use graph::{Graph, GraphBuilder, NodeId, ValueRef};
pub use lower::{convert, Converter, LoweredGraph};
pub use ops::{default_registry, ConversionRule, OpId, Registry};
pub use pipeline::{compile_graph, CompileOptions};
pub use shapes::{DimRange, Extent, InputSpec, ShapeRange};
pub use types::DType;
