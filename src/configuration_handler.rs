use crate::{configuration::Configuration, error::Result, slots::SlotSequence};
use chrono::NaiveTime;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "cabin_booking", about = "Cabin reservation service")]
pub struct ConfigurationHandler {
    /// Port the HTTP service listens on
    #[arg(long, env = "CABIN_BOOKING_PORT", default_value_t = 8080)]
    port: u16,

    /// Persist bookings to this JSON file instead of keeping them in memory
    #[arg(long, env = "CABIN_BOOKING_DATA_FILE")]
    data_file: Option<PathBuf>,

    /// Start of the first bookable slot (HH:MM)
    #[arg(long, default_value = "09:00", value_parser = parse_time)]
    first_slot: NaiveTime,

    #[arg(long, default_value_t = 30)]
    slot_minutes: u32,

    #[arg(long, default_value_t = 16)]
    slot_count: usize,

    #[arg(long, default_value_t = 1.5)]
    max_duration_hours: f64,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> u16 {
        self.port
    }

    fn data_file(&self) -> Option<PathBuf> {
        self.data_file.clone()
    }

    fn slot_sequence(&self) -> Result<SlotSequence> {
        SlotSequence::new(
            self.first_slot,
            self.slot_minutes,
            self.slot_count,
            self.max_duration_hours,
        )
    }
}

fn parse_time(value: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|err| format!("expected HH:MM, got '{value}': {err}"))
}
