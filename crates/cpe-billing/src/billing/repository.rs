use super::domain::{Client, Invoice, Product, Provider};
use crate::store::RepositoryError;

/// Client storage. Ids are assigned by the store on insert.
pub trait ClientRepository: Send + Sync {
    fn insert_client(&self, client: Client) -> Result<Client, RepositoryError>;
    fn update_client(&self, client: Client) -> Result<(), RepositoryError>;
    fn client(&self, id: u64) -> Result<Option<Client>, RepositoryError>;
    /// Ordered by name.
    fn clients(&self) -> Result<Vec<Client>, RepositoryError>;
    /// Client whose tax id has these digits (separators ignored), or `candidate` stored
    /// under a new id. The flag is true when `candidate` was inserted.
    fn client_for_tax_digits(
        &self,
        digits: &str,
        candidate: Client,
    ) -> Result<(Client, bool), RepositoryError>;
}

pub trait ProviderRepository: Send + Sync {
    fn insert_provider(&self, provider: Provider) -> Result<Provider, RepositoryError>;
    fn provider(&self, id: u64) -> Result<Option<Provider>, RepositoryError>;
    fn providers(&self) -> Result<Vec<Provider>, RepositoryError>;
    fn provider_by_tax_digits(&self, digits: &str) -> Result<Option<Provider>, RepositoryError>;
}

/// Product storage. `afip_code` is unique; duplicates are a [`RepositoryError::Conflict`].
pub trait ProductRepository: Send + Sync {
    fn insert_product(&self, product: Product) -> Result<Product, RepositoryError>;
    fn update_product(&self, product: Product) -> Result<(), RepositoryError>;
    fn product(&self, id: u64) -> Result<Option<Product>, RepositoryError>;
    fn products(&self) -> Result<Vec<Product>, RepositoryError>;
    fn delete_product(&self, id: u64) -> Result<(), RepositoryError>;
    /// Product named on a waybill: matched by `afip_code`, or without one by a
    /// case-insensitive `description` match. Missing products are created with a zero
    /// tariff and a differing description renames the match.
    fn waybill_product(
        &self,
        afip_code: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Product>, RepositoryError>;
}

pub trait InvoiceRepository: Send + Sync {
    fn insert_invoice(&self, invoice: Invoice) -> Result<Invoice, RepositoryError>;
    /// Newest first.
    fn invoices(&self) -> Result<Vec<Invoice>, RepositoryError>;
}

/// Everything the catalog and invoice services need from storage.
pub trait BillingStore:
    ClientRepository + ProviderRepository + ProductRepository + InvoiceRepository
{
}

impl<T> BillingStore for T where
    T: ClientRepository + ProviderRepository + ProductRepository + InvoiceRepository
{
}
