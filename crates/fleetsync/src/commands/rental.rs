//! Rental listing and refunds.

use std::sync::Arc;

use tabled::Tabled;

use fleetsync_core::{Command, Fleet, Rental, RentalId, StationId};

use crate::cli::{GlobalOpts, RentalArgs, RentalCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct RentalRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Station")]
    station: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Started")]
    started: String,
}

impl From<&Arc<Rental>> for RentalRow {
    fn from(r: &Arc<Rental>) -> Self {
        Self {
            id: r.id.to_string(),
            station: r
                .station_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            status: r.status.clone(),
            amount: match (r.amount, r.currency.as_deref()) {
                (Some(amount), Some(currency)) => format!("{amount} {currency}"),
                (Some(amount), None) => amount.to_string(),
                (None, _) => String::new(),
            },
            started: r
                .started_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        }
    }
}

pub async fn handle(fleet: &Fleet, args: RentalArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        RentalCommand::List { station } => {
            fleet.wait_for_rentals(util::timeout(global)).await?;
            let wanted = station.map(StationId::from);
            let snap: Vec<Arc<Rental>> = fleet
                .rentals()
                .iter()
                .filter(|r| wanted.is_none() || r.station_id == wanted)
                .cloned()
                .collect();
            let out =
                output::render_list(global.output, &snap, |r| RentalRow::from(r), |r| r.id.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RentalCommand::Refund {
            station,
            rental,
            amount,
        } => {
            util::ready(fleet, global, true).await?;
            let station = util::find_station(fleet, &station)?.id.clone();
            let command = Command::Refund {
                station,
                rental: RentalId::from(rental),
                amount,
            };
            util::run_command(fleet, command, global).await
        }
    }
}
