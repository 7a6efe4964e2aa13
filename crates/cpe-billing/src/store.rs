//! Repository errors and the in-memory store backing every repository trait.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use rust_decimal::Decimal;

use crate::afip::only_digits;
use crate::billing::{
    Client, ClientRepository, Invoice, InvoiceRepository, Product, ProductRepository, Provider,
    ProviderRepository,
};
use crate::trips::{CpeAutomotor, CpeRepository, Vehicle, VehicleRepository};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Rows keyed by id, handing out sequential ids starting at 1.
#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<u64, T>,
    next_id: u64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Table<T> {
    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn get(&self, id: u64) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.rows.values().find(|row| predicate(row)).cloned()
    }

    fn replace(&mut self, id: u64, row: T) -> Result<(), RepositoryError> {
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    clients: Table<Client>,
    providers: Table<Provider>,
    products: Table<Product>,
    invoices: Table<Invoice>,
    cpes: Table<CpeAutomotor>,
    vehicles: Table<Vehicle>,
}

/// Process-local store; every table lives behind one mutex.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn code_taken(tables: &Tables, product: &Product) -> bool {
    let Some(code) = product.afip_code.as_deref() else {
        return false;
    };
    tables
        .products
        .rows
        .values()
        .any(|other| other.id != product.id && other.afip_code.as_deref() == Some(code))
}

impl ClientRepository for InMemoryStore {
    fn insert_client(&self, mut client: Client) -> Result<Client, RepositoryError> {
        let mut tables = self.lock()?;
        client.id = tables.clients.allocate();
        tables.clients.rows.insert(client.id, client.clone());
        Ok(client)
    }

    fn update_client(&self, client: Client) -> Result<(), RepositoryError> {
        self.lock()?.clients.replace(client.id, client)
    }

    fn client(&self, id: u64) -> Result<Option<Client>, RepositoryError> {
        Ok(self.lock()?.clients.get(id))
    }

    fn clients(&self) -> Result<Vec<Client>, RepositoryError> {
        let mut clients: Vec<Client> = self.lock()?.clients.rows.values().cloned().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(clients)
    }

    fn client_for_tax_digits(
        &self,
        digits: &str,
        mut candidate: Client,
    ) -> Result<(Client, bool), RepositoryError> {
        let mut tables = self.lock()?;
        if !digits.is_empty() {
            if let Some(client) = tables
                .clients
                .find(|client| only_digits(&client.tax_id) == digits)
            {
                return Ok((client, false));
            }
        }
        candidate.id = tables.clients.allocate();
        tables.clients.rows.insert(candidate.id, candidate.clone());
        Ok((candidate, true))
    }
}

impl ProviderRepository for InMemoryStore {
    fn insert_provider(&self, mut provider: Provider) -> Result<Provider, RepositoryError> {
        let mut tables = self.lock()?;
        provider.id = tables.providers.allocate();
        tables.providers.rows.insert(provider.id, provider.clone());
        Ok(provider)
    }

    fn provider(&self, id: u64) -> Result<Option<Provider>, RepositoryError> {
        Ok(self.lock()?.providers.get(id))
    }

    fn providers(&self) -> Result<Vec<Provider>, RepositoryError> {
        let mut providers: Vec<Provider> =
            self.lock()?.providers.rows.values().cloned().collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(providers)
    }

    fn provider_by_tax_digits(&self, digits: &str) -> Result<Option<Provider>, RepositoryError> {
        if digits.is_empty() {
            return Ok(None);
        }
        Ok(self
            .lock()?
            .providers
            .find(|provider| only_digits(&provider.tax_id) == digits))
    }
}

impl ProductRepository for InMemoryStore {
    fn insert_product(&self, mut product: Product) -> Result<Product, RepositoryError> {
        let mut tables = self.lock()?;
        product.id = 0;
        if code_taken(&tables, &product) {
            return Err(RepositoryError::Conflict);
        }
        product.id = tables.products.allocate();
        tables.products.rows.insert(product.id, product.clone());
        Ok(product)
    }

    fn update_product(&self, product: Product) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if code_taken(&tables, &product) {
            return Err(RepositoryError::Conflict);
        }
        tables.products.replace(product.id, product)
    }

    fn product(&self, id: u64) -> Result<Option<Product>, RepositoryError> {
        Ok(self.lock()?.products.get(id))
    }

    fn products(&self) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self.lock()?.products.rows.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    fn delete_product(&self, id: u64) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        tables
            .products
            .rows
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        for cpe in tables.cpes.rows.values_mut() {
            if cpe.product_id == Some(id) {
                cpe.product_id = None;
            }
        }
        Ok(())
    }

    fn waybill_product(
        &self,
        afip_code: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut tables = self.lock()?;
        let existing = match (afip_code, description) {
            (Some(code), _) => tables
                .products
                .find(|product| product.afip_code.as_deref() == Some(code)),
            (None, Some(name)) => {
                let wanted = name.to_lowercase();
                tables
                    .products
                    .find(|product| product.name.to_lowercase() == wanted)
            }
            (None, None) => return Ok(None),
        };

        let mut product = match existing {
            Some(product) => product,
            None => Product {
                id: tables.products.allocate(),
                name: description.or(afip_code).unwrap_or_default().to_string(),
                afip_code: afip_code.map(str::to_string),
                default_tariff: Decimal::new(0, 2),
            },
        };
        if let Some(name) = description {
            product.name = name.to_string();
        }
        tables.products.rows.insert(product.id, product.clone());
        Ok(Some(product))
    }
}

impl InvoiceRepository for InMemoryStore {
    fn insert_invoice(&self, mut invoice: Invoice) -> Result<Invoice, RepositoryError> {
        let mut tables = self.lock()?;
        invoice.id = tables.invoices.allocate();
        tables.invoices.rows.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    fn invoices(&self) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(self.lock()?.invoices.rows.values().rev().cloned().collect())
    }
}

impl CpeRepository for InMemoryStore {
    fn upsert_cpe(
        &self,
        nro_ctg: &str,
        apply: &mut dyn FnMut(&mut CpeAutomotor, bool),
    ) -> Result<(CpeAutomotor, bool), RepositoryError> {
        let mut tables = self.lock()?;
        let existing = tables.cpes.find(|cpe| cpe.nro_ctg == nro_ctg);
        let created = existing.is_none();
        let mut cpe = existing.unwrap_or_else(|| CpeAutomotor::new(nro_ctg));
        apply(&mut cpe, created);
        cpe.nro_ctg = nro_ctg.to_string();
        if created {
            cpe.id = tables.cpes.allocate();
        }
        tables.cpes.rows.insert(cpe.id, cpe.clone());
        Ok((cpe, created))
    }

    fn update_cpe(&self, cpe: CpeAutomotor) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let duplicate = tables
            .cpes
            .rows
            .values()
            .any(|other| other.id != cpe.id && other.nro_ctg == cpe.nro_ctg);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        tables.cpes.replace(cpe.id, cpe)
    }

    fn cpe(&self, id: u64) -> Result<Option<CpeAutomotor>, RepositoryError> {
        Ok(self.lock()?.cpes.get(id))
    }

    fn cpes(&self) -> Result<Vec<CpeAutomotor>, RepositoryError> {
        Ok(self.lock()?.cpes.rows.values().cloned().collect())
    }

    fn cpes_for_client(&self, client_id: u64) -> Result<Vec<CpeAutomotor>, RepositoryError> {
        Ok(self
            .lock()?
            .cpes
            .rows
            .values()
            .filter(|cpe| cpe.client_id == Some(client_id))
            .cloned()
            .collect())
    }
}

impl VehicleRepository for InMemoryStore {
    fn vehicle_for_domain(&self, domain: &str) -> Result<Vehicle, RepositoryError> {
        let mut tables = self.lock()?;
        if let Some(vehicle) = tables.vehicles.find(|vehicle| vehicle.domain == domain) {
            return Ok(vehicle);
        }
        let vehicle = Vehicle {
            id: tables.vehicles.allocate(),
            domain: domain.to_string(),
        };
        tables.vehicles.rows.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    fn vehicle(&self, id: u64) -> Result<Option<Vehicle>, RepositoryError> {
        Ok(self.lock()?.vehicles.get(id))
    }
}
