//! Electronic waybills (CPE automotor) reconciled against the billing catalog.

pub mod domain;
pub mod reconcile;
pub mod repository;
pub mod router;
pub mod service;

pub use domain::{CpeAutomotor, CpeInvoiceView, CpeListView, DomainStat, DomainStatistics, Vehicle};
pub use repository::{CpeRepository, TripStore, VehicleRepository};
pub use router::cpe_router;
pub use service::{CpeService, CpeServiceError, WaybillSource};
