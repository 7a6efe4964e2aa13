use std::sync::Arc;

use super::domain::{Client, ClientView, Product, Provider};
use super::repository::BillingStore;
use super::validation::{ClientPayload, FieldErrors, ProductPayload, ProviderPayload};
use crate::store::RepositoryError;

const DUPLICATE_AFIP_CODE: &str = "Ya existe un producto con este código AFIP.";

/// CRUD over clients, providers and products.
pub struct CatalogService<S> {
    store: Arc<S>,
}

impl<S> CatalogService<S>
where
    S: BillingStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn clients(&self) -> Result<Vec<ClientView>, CatalogError> {
        Ok(self.store.clients()?.iter().map(Client::view).collect())
    }

    pub fn client(&self, id: u64) -> Result<ClientView, CatalogError> {
        Ok(self.load_client(id)?.view())
    }

    pub fn create_client(&self, payload: &ClientPayload) -> Result<ClientView, CatalogError> {
        let client = payload.new_client()?;
        Ok(self.store.insert_client(client)?.view())
    }

    /// `partial` selects PATCH semantics.
    pub fn update_client(
        &self,
        id: u64,
        payload: &ClientPayload,
        partial: bool,
    ) -> Result<ClientView, CatalogError> {
        let mut client = self.load_client(id)?;
        payload.apply(&mut client, partial)?;
        self.store.update_client(client.clone())?;
        Ok(client.view())
    }

    pub fn providers(&self) -> Result<Vec<Provider>, CatalogError> {
        Ok(self.store.providers()?)
    }

    pub fn create_provider(&self, payload: &ProviderPayload) -> Result<Provider, CatalogError> {
        let provider = payload.provider()?;
        Ok(self.store.insert_provider(provider)?)
    }

    pub fn products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.store.products()?)
    }

    pub fn product(&self, id: u64) -> Result<Product, CatalogError> {
        self.store.product(id)?.ok_or(CatalogError::NotFound)
    }

    pub fn create_product(&self, payload: &ProductPayload) -> Result<Product, CatalogError> {
        let product = payload.new_product()?;
        self.store
            .insert_product(product)
            .map_err(duplicate_code_as_field_error)
    }

    pub fn update_product(
        &self,
        id: u64,
        payload: &ProductPayload,
        partial: bool,
    ) -> Result<Product, CatalogError> {
        let mut product = self.product(id)?;
        payload.apply(&mut product, partial)?;
        self.store
            .update_product(product.clone())
            .map_err(duplicate_code_as_field_error)?;
        Ok(product)
    }

    pub fn delete_product(&self, id: u64) -> Result<(), CatalogError> {
        match self.store.delete_product(id) {
            Err(RepositoryError::NotFound) => Err(CatalogError::NotFound),
            other => Ok(other?),
        }
    }

    fn load_client(&self, id: u64) -> Result<Client, CatalogError> {
        self.store.client(id)?.ok_or(CatalogError::NotFound)
    }
}

fn duplicate_code_as_field_error(err: RepositoryError) -> CatalogError {
    match err {
        RepositoryError::Conflict => {
            CatalogError::Validation(FieldErrors::single("afip_code", DUPLICATE_AFIP_CODE))
        }
        other => CatalogError::Repository(other),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid payload: {0}")]
    Validation(#[from] FieldErrors),
    #[error("No encontrado.")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
