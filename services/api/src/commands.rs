use clap::Subcommand;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::infra::AfipClients;
use cpe_billing::afip::AfipService;
use cpe_billing::config::AppConfig;
use cpe_billing::error::AppError;
use cpe_billing::store::InMemoryStore;
use cpe_billing::telemetry;
use cpe_billing::trips::CpeService;

#[derive(Subcommand, Debug)]
pub(crate) enum AfipCommand {
    /// Obtain or renew the access ticket of a service
    Token {
        /// wsfe, wscpe or ws_sr_padron_a13
        #[arg(long, value_parser = parse_service)]
        service: AfipService,
    },
    /// Consult a waybill by CTG and print it reconciled
    Cpe {
        #[arg(long)]
        ctg: String,
        /// Gross unload weight used when AFIP reports none
        #[arg(long)]
        peso: Option<Decimal>,
    },
    /// Look a CUIT up in the A13 registry
    Padron {
        #[arg(long)]
        cuit: String,
    },
    /// List the voucher types enabled for a point of sale
    Tipos {
        #[arg(long)]
        pto_vta: u32,
    },
}

fn parse_service(value: &str) -> Result<AfipService, String> {
    value.parse().map_err(|err| format!("{err}"))
}

pub(crate) async fn run_afip(command: AfipCommand) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let afip = AfipClients::from_config(&config.afip)?;

    match command {
        AfipCommand::Token { service } => {
            let ticket = afip.wsaa.ticket(service).await?;
            println!("Service: {}", ticket.service);
            println!("Expires: {}", ticket.expires_at.to_rfc3339());
            println!("Cache:   {}", afip.wsaa.store().path_for(service).display());
        }
        AfipCommand::Cpe { ctg, peso } => {
            let service = CpeService::new(Arc::new(InMemoryStore::new()), afip.wscpe);
            let cpe = service.consult(&ctg, peso).await?;
            println!("{}", serde_json::to_string_pretty(&cpe)?);
        }
        AfipCommand::Padron { cuit } => match afip.padron.lookup(&cuit).await? {
            Some(persona) => println!("{}", serde_json::to_string_pretty(&persona)?),
            None => println!("CUIT {cuit} not found in the A13 registry"),
        },
        AfipCommand::Tipos { pto_vta } => {
            let types = afip.wsfe.voucher_types(pto_vta).await?;
            println!("Enabled voucher types for point of sale {pto_vta}:");
            for cbte_tipo in types {
                println!("  - {cbte_tipo}");
            }
        }
    }

    Ok(())
}
