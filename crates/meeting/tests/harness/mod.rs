//! Meeting test harness
//!
//! Runs several [`MeetingController`]s against an in-memory relay
//! ([`SignalingHub`]) and scripted transports ([`FakeConnector`]). Everything
//! is driven by hand from the test task, so scenarios are deterministic:
//!
//! 1. Create a `MeetingHarness` for a room and host
//! 2. Add participants with `harness.add(..)`
//! 3. Call controller methods through `harness.get_mut(..)`
//! 4. Call `harness.settle()` to deliver every queued event, or
//!    `harness.step(..)` to advance a single participant
//! 5. Assert on snapshots, the hub log and the fake transports

#![allow(dead_code)]

pub mod fake_peer;
pub mod hub;

use meeting_mesh::{
    MediaDevices, MeetingConfig, MeetingController, MeetingMetadata, SampleTrackDevices,
};
use std::sync::Arc;

pub use fake_peer::{FakeConnector, FakeTransport};
pub use hub::SignalingHub;

/// Upper bound on delivery rounds before `settle` gives up
const MAX_ROUNDS: usize = 100;

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Meeting error: {0}")]
    Meeting(#[from] meeting_mesh::Error),
}

/// One simulated participant
pub struct TestParticipant {
    pub id: String,
    pub controller: MeetingController,
    pub connector: Arc<FakeConnector>,
}

pub struct MeetingHarness {
    pub hub: Arc<SignalingHub>,
    pub metadata: MeetingMetadata,
    pub config: MeetingConfig,
    participants: Vec<TestParticipant>,
}

impl MeetingHarness {
    pub fn new(room_id: &str, host_id: &str) -> Self {
        Self {
            hub: SignalingHub::new(),
            metadata: MeetingMetadata::ad_hoc(room_id, host_id),
            config: MeetingConfig::default(),
            participants: Vec::new(),
        }
    }

    /// Participant with working devices and media-producing transports
    pub fn add(&mut self, id: &str) {
        self.add_with(id, Arc::new(SampleTrackDevices::default()), FakeConnector::new());
    }

    pub fn add_with(
        &mut self,
        id: &str,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<FakeConnector>,
    ) {
        let controller = self.build_controller(id, devices, connector.clone());
        self.participants.push(TestParticipant {
            id: id.to_string(),
            controller,
            connector,
        });
    }

    pub fn build_controller(
        &self,
        id: &str,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<FakeConnector>,
    ) -> MeetingController {
        MeetingController::new(
            self.config.clone(),
            self.metadata.clone(),
            id,
            devices,
            self.hub.channel(id),
            connector,
        )
        .expect("valid harness config")
    }

    pub fn get(&self, id: &str) -> &TestParticipant {
        self.participants
            .iter()
            .find(|p| p.id == id)
            .unwrap_or_else(|| panic!("no participant {}", id))
    }

    pub fn get_mut(&mut self, id: &str) -> &mut TestParticipant {
        self.participants
            .iter_mut()
            .find(|p| p.id == id)
            .unwrap_or_else(|| panic!("no participant {}", id))
    }

    /// Remove a participant from the harness, e.g. to run its event loop
    pub fn take(&mut self, id: &str) -> HarnessResult<TestParticipant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| HarnessError::UnknownParticipant(id.to_string()))?;
        Ok(self.participants.remove(index))
    }

    /// Join one participant and deliver the fallout
    pub async fn join(&mut self, id: &str) -> HarnessResult<()> {
        self.get_mut(id).controller.join().await?;
        self.settle().await?;
        Ok(())
    }

    /// Deliver what is queued for one participant, leaving the others alone
    pub async fn step(&mut self, id: &str) -> HarnessResult<usize> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| HarnessError::UnknownParticipant(id.to_string()))?;

        let mut handled = 0;
        for event in self.hub.take_inbox(id) {
            participant.controller.handle_signaling_event(event).await;
            handled += 1;
        }
        handled += participant.controller.process_peer_events().await;
        Ok(handled)
    }

    /// Deliver queued signaling and transport events until nothing moves
    pub async fn settle(&mut self) -> HarnessResult<usize> {
        let mut total = 0;

        for _ in 0..MAX_ROUNDS {
            let mut progress = 0;
            for participant in self.participants.iter_mut() {
                for event in self.hub.take_inbox(&participant.id) {
                    participant.controller.handle_signaling_event(event).await;
                    progress += 1;
                }
                progress += participant.controller.process_peer_events().await;
            }

            if progress == 0 {
                return Ok(total);
            }
            total += progress;
        }

        Err(HarnessError::Timeout(format!(
            "events still flowing after {} rounds",
            MAX_ROUNDS
        )))
    }
}
