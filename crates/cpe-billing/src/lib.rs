//! Freight billing back office: clients, products, waybills and invoices backed by the
//! AFIP authentication, invoicing, waybill and taxpayer registry web services.

pub mod afip;
pub mod billing;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod trips;
