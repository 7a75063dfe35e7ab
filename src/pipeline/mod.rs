// Export cleaning, outbound batching, and the run loops that drive them

pub mod integrator;
pub mod sender;
pub mod table;
pub mod transform;

pub use integrator::{transform_file, Integrator, RunReport};
pub use sender::{BatchSender, DataEventRow};
pub use table::{Cell, Table};
pub use transform::{TableTransformer, TransformReport};
