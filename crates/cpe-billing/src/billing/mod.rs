//! Clients, providers, products and AFIP-authorized invoices.

pub mod catalog;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

pub use catalog::{CatalogError, CatalogService};
pub use domain::{
    Client, ClientView, Invoice, InvoiceMetadata, InvoiceView, Product, Provider, TaxCondition,
};
pub use repository::{
    BillingStore, ClientRepository, InvoiceRepository, ProductRepository, ProviderRepository,
};
pub use router::{catalog_router, invoice_router, padron_router};
pub use service::{InvoiceService, InvoiceServiceError};
pub use validation::{
    ClientPayload, EmitInvoiceCommand, EmitInvoicePayload, FieldErrors, ProductPayload,
    ProviderPayload, TariffPayload,
};
