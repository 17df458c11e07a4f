//! Simulated flight providers.
//!
//! Every provider is the same [`SimulatedProvider`] driven by a different
//! [`ProviderProfile`]: random latency, an occasional quick failure, and a
//! handful of offers generated deterministically from the route and date, so
//! repeating a search yields the same flights.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, TimeDelta};
use flightsearch_core::{
    FlightOffer, FlightProvider, ProviderRegistry, ProviderReply, ProviderRequest, SearchError,
    SearchRequest,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::config::{ProviderProfile, Span};

/// A provider backend that fakes a remote flight API.
pub struct SimulatedProvider {
    profile: ProviderProfile,
}

impl SimulatedProvider {
    /// # Errors
    ///
    /// Returns a config error if `profile` is invalid.
    pub fn new(profile: ProviderProfile) -> crate::error::Result<Self> {
        profile.validate()?;
        Ok(Self { profile })
    }

    /// Offers this provider returns for `request`, identical on every call.
    pub fn generate_offers(&self, request: &SearchRequest) -> Vec<FlightOffer> {
        let profile = &self.profile;
        let mut rng = StdRng::seed_from_u64(route_seed(&profile.id, request));
        let count = pick(&mut rng, profile.offers);

        (0..count)
            .map(|_| {
                let airline = &profile.airlines[rng.gen_range(0..profile.airlines.len())];
                let flight_number =
                    &profile.flight_numbers[rng.gen_range(0..profile.flight_numbers.len())];
                let hour = pick(&mut rng, profile.departure_hours);
                let duration = pick(&mut rng, profile.duration_minutes);
                let stops = rng.gen_range(0..=profile.max_stops);
                let price = pick(&mut rng, profile.base_price)
                    + u32::from(stops) * profile.stop_surcharge;

                let departure = request
                    .departure_date
                    .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
                    .and_utc();
                FlightOffer {
                    provider: profile.id.clone(),
                    flight_number: flight_number.clone(),
                    airline: airline.clone(),
                    departure_time: departure,
                    arrival_time: departure + TimeDelta::minutes(i64::from(duration)),
                    origin: request.origin.clone(),
                    destination: request.destination.clone(),
                    price: f64::from(price),
                    currency: profile.currency.clone(),
                    duration_minutes: duration,
                    stops,
                }
            })
            .collect()
    }

    /// Decide the outcome and latency of one call.
    fn roll(&self) -> (bool, Duration) {
        let mut rng = rand::thread_rng();
        let fails = rng.gen_bool(self.profile.failure_rate);
        let span = if fails {
            self.profile.failure_delay_ms
        } else {
            self.profile.delay_ms
        };
        (fails, Duration::from_millis(rng.gen_range(span.min..=span.max)))
    }
}

#[async_trait]
impl FlightProvider for SimulatedProvider {
    fn id(&self) -> &str {
        &self.profile.id
    }

    async fn search(&self, request: &ProviderRequest) -> Result<ProviderReply, SearchError> {
        let started = Instant::now();
        let search = &request.request;
        tracing::info!(
            provider = %self.profile.id,
            search_id = %request.search_id,
            origin = %search.origin,
            destination = %search.destination,
            date = %search.departure_date,
            "simulating flight search"
        );

        let (fails, delay) = self.roll();
        tracing::debug!(
            provider = %self.profile.id,
            delay_ms = delay.as_millis() as u64,
            fails,
            "simulated latency"
        );
        tokio::time::sleep(delay).await;

        if fails {
            tracing::warn!(provider = %self.profile.id, search_id = %request.search_id, "simulated outage");
            return Ok(ProviderReply::failure(
                &self.profile.id,
                format!("{} service temporarily unavailable", self.profile.id),
                started.elapsed(),
            ));
        }

        let offers = self.generate_offers(search);
        tracing::info!(
            provider = %self.profile.id,
            search_id = %request.search_id,
            offers = offers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation completed"
        );
        Ok(ProviderReply::success(&self.profile.id, offers, started.elapsed()))
    }
}

/// Build the provider registry from configured profiles, in order.
///
/// # Errors
///
/// Returns an error if a profile is invalid or an id repeats.
pub fn build_registry(profiles: &[ProviderProfile]) -> crate::error::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for profile in profiles {
        registry.register(Arc::new(SimulatedProvider::new(profile.clone())?))?;
    }
    Ok(registry)
}

fn pick<R: Rng>(rng: &mut R, span: Span<u32>) -> u32 {
    rng.gen_range(span.min..=span.max)
}

fn route_seed(provider: &str, request: &SearchRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    provider.hash(&mut hasher);
    request.origin.hash(&mut hasher);
    request.destination.hash(&mut hasher);
    request.departure_date.hash(&mut hasher);
    hasher.finish()
}
