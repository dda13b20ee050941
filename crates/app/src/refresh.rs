//! Periodic availability re-evaluation.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rvc_domain::availability::AvailabilityPolicy;

use crate::event_bus::StateChangeBus;
use crate::reducers::StateChange;

/// Spawn the ticker nudging subscribers to re-read availability.
///
/// Availability is derived from `last_seen` whenever a snapshot is taken, so
/// the ticker mutates nothing; it only broadcasts
/// [`StateChange::AvailabilityRefresh`]. Returns `None` when the policy never
/// expires devices.
#[must_use]
pub fn spawn_refresh_ticker(
    policy: AvailabilityPolicy,
    bus: StateChangeBus,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    let period = policy.refresh_interval()?;
    tracing::debug!(?period, "availability refresh ticker started");
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => bus.publish(StateChange::AvailabilityRefresh),
            }
        }
    }))
}
