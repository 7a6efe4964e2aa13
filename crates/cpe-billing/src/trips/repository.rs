use super::domain::{CpeAutomotor, Vehicle};
use crate::billing::BillingStore;
use crate::store::RepositoryError;

/// Waybill storage keyed by id, with `nro_ctg` unique.
pub trait CpeRepository: Send + Sync {
    /// Create or update the waybill with `nro_ctg` in one step. `apply` fills in the row
    /// and is told whether it is new; the returned flag says the same.
    fn upsert_cpe(
        &self,
        nro_ctg: &str,
        apply: &mut dyn FnMut(&mut CpeAutomotor, bool),
    ) -> Result<(CpeAutomotor, bool), RepositoryError>;
    fn update_cpe(&self, cpe: CpeAutomotor) -> Result<(), RepositoryError>;
    fn cpe(&self, id: u64) -> Result<Option<CpeAutomotor>, RepositoryError>;
    fn cpes(&self) -> Result<Vec<CpeAutomotor>, RepositoryError>;
    fn cpes_for_client(&self, client_id: u64) -> Result<Vec<CpeAutomotor>, RepositoryError>;
}

pub trait VehicleRepository: Send + Sync {
    /// Existing vehicle with that plate, or a newly stored one.
    fn vehicle_for_domain(&self, domain: &str) -> Result<Vehicle, RepositoryError>;
    fn vehicle(&self, id: u64) -> Result<Option<Vehicle>, RepositoryError>;
}

/// Storage used by the waybill reconciliation, which also touches the billing catalog.
pub trait TripStore: BillingStore + CpeRepository + VehicleRepository {}

impl<T> TripStore for T where T: BillingStore + CpeRepository + VehicleRepository {}
