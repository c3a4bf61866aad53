pub mod accessor;
pub mod catalog;
pub mod job;
pub mod location;
pub mod models;
pub mod selection;
pub mod structure;
pub mod transfer_engine;
pub mod validation;

pub use accessor::{Accessor, AccessorError, DiskAccessor, UrlSigner};
pub use catalog::{CatalogConnector, EntityCatalog, MemoryCatalog, MemoryConnector, QueryError};
pub use location::{AccessorTransfer, Location, LocationError, LocationRegistry, LocationService};
pub use models::{
    Component, EntityType, Job, JobStatus, JobStatusEntry, JobWithHistory, LocationRecord,
    SelectionItem,
};
pub use structure::{StandardStructure, Structure};
pub use transfer_engine::{
    TransferEngine, TransferError, TransferHandle, TransferOptions, TransferRequest,
    TransferSpawner, TransferSummary,
};
pub use validation::{ValidationError, validate_locations};
