use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{
    self, DeviceRequest, Endpoints, Error, Expect, Result, Transport,
};
use crate::engine::state::{HeatingMode, ThermostatState};
use crate::store::StateStore;

/// Grace period, in seconds, the remote device is given to wind down when
/// told to stop heating. Fixed by the device's protocol.
const SHUTDOWN_DELAY: f64 = 5.0;

/// Synchronization engine for one thermostat accessory.
///
/// Owns the in-memory [`ThermostatState`] and reconciles it with the durable
/// store and the remote device. All hub-facing operations go through here;
/// nothing else mutates the state.
///
/// Operations are not mutually excluded: the state lock is only held for
/// non-suspending read/modify sections, so two in-flight operations
/// interleave at the HTTP and store await points and the last response to
/// arrive wins. Acceptable at this request rate, not a guarantee.
pub struct Thermostat<T> {
    id: String,
    endpoints: Endpoints,
    poll_interval: Duration,
    transport: T,
    store: StateStore,
    state: Mutex<ThermostatState>,
}

impl<T: Transport> Thermostat<T> {
    pub fn new(
        id: String,
        endpoints: Endpoints,
        poll_interval: Duration,
        transport: T,
        store: StateStore,
    ) -> Self {
        Self {
            id,
            endpoints,
            poll_interval,
            transport,
            store,
            state: Mutex::new(ThermostatState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Load the durable state and prime the first temperature reading.
    ///
    /// Until this runs the engine serves defaults. A failed load keeps the
    /// store uninitialized, so later saves cannot clobber it. The initial
    /// fetch is best effort; the poll loop catches up if it fails.
    pub async fn initialize(&self) {
        match self.store.load().await {
            Ok(persisted) => {
                {
                    let mut state = self.state();
                    state.apply_persisted(&persisted);
                }
                info!(
                    "[{}] restored state: current {}, target {}, mode {}",
                    self.id,
                    persisted.current_temperature,
                    persisted.target_temperature,
                    persisted.target_mode
                );
            }
            Err(e) => {
                warn!(
                    "[{}] failed to load persisted state, serving defaults: {}",
                    self.id, e
                );
            }
        }

        if self.endpoints.get_temperature.is_some() {
            if let Err(e) = self.current_temperature().await {
                warn!("[{}] initial temperature fetch failed: {}", self.id, e);
            }
        }
    }

    /// Fetch the current temperature from the device and cache it.
    ///
    /// On any failure the cached reading keeps its last good value.
    pub async fn current_temperature(&self) -> Result<f64> {
        let endpoint = self
            .endpoints
            .get_temperature
            .as_ref()
            .ok_or(Error::Unconfigured("get_temperature"))?;

        debug!("[{}] fetching temperature from {}", self.id, endpoint.url);
        let request = DeviceRequest::build(endpoint, None);
        let payload = self.transport.execute(request, Expect::JsonOrText).await?;

        if let Some(message) = device::error_message(&payload) {
            return Err(Error::Device(message));
        }

        let value = device::extract_temperature(&payload);
        self.state().current_temperature = value;
        Ok(value)
    }

    /// Pure read of the cached target temperature. No I/O.
    pub fn target_temperature(&self) -> f64 {
        self.state().target_temperature
    }

    /// Pure read of the cached target mode. No I/O.
    pub fn target_mode(&self) -> HeatingMode {
        self.state().target_mode
    }

    /// Pure read of the cached current mode. No I/O.
    pub fn current_mode(&self) -> HeatingMode {
        self.state().current_mode
    }

    /// Push a new setpoint to the device, then accept it locally.
    ///
    /// The local value is only updated after a successful exchange; a failed
    /// one is reported and leaves the previous setpoint in place.
    pub async fn set_target_temperature(&self, value: f64) -> Result<()> {
        let endpoint = self
            .endpoints
            .set_temperature
            .as_ref()
            .ok_or(Error::Unconfigured("set_temperature"))?;

        info!("[{}] hub requested target temperature {}", self.id, value);
        let request = DeviceRequest::build(endpoint, Some(value));
        match self.transport.execute(request, Expect::JsonOrText).await {
            Ok(_) => {
                self.state().target_temperature = value;
                self.save_state().await;
                Ok(())
            }
            Err(e) => {
                warn!("[{}] failed to set target temperature: {}", self.id, e);
                Err(e)
            }
        }
    }

    /// Switch the heating mode.
    ///
    /// The mode is applied and persisted locally up front. Turning OFF then
    /// notifies the device, passing the shutdown grace period; a device-side
    /// error fails the operation but the local mode stays applied, leaving
    /// the mirror ahead of the device until the next successful exchange.
    /// Switching to HEAT involves no remote call: the device resumes heating
    /// once it is no longer told to stop.
    pub async fn set_target_mode(&self, mode: HeatingMode) -> Result<()> {
        {
            let mut state = self.state();
            state.target_mode = mode;
            state.current_mode = mode;
        }
        info!("[{}] heating mode set to {}", self.id, mode);
        self.save_state().await;

        if mode == HeatingMode::Off {
            let endpoint = self
                .endpoints
                .set_off
                .as_ref()
                .ok_or(Error::Unconfigured("set_off"))?;

            let request = DeviceRequest::build(endpoint, Some(SHUTDOWN_DELAY));
            let payload = self.transport.execute(request, Expect::Json).await?;
            if let Some(message) = device::error_message(&payload) {
                warn!("[{}] device rejected shutdown: {}", self.id, message);
                return Err(Error::Device(message));
            }
        }

        Ok(())
    }

    /// Refresh the temperature on a fixed interval.
    ///
    /// Failures are logged and never escape a tick; the next tick simply
    /// tries again. No retries happen within a tick.
    pub fn spawn_poll_loop(self: Arc<Self>) -> JoinHandle<()>
    where
        T: 'static,
    {
        info!(
            "[{}] polling temperature every {}s",
            self.id,
            self.poll_interval.as_secs()
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                match self.current_temperature().await {
                    Ok(value) => debug!("[{}] updated temperature to {}", self.id, value),
                    Err(e) => warn!("[{}] temperature poll failed: {}", self.id, e),
                }
            }
        })
    }

    async fn save_state(&self) {
        let persisted = self.state().to_persisted();
        if let Err(e) = self.store.save(&persisted).await {
            warn!("[{}] failed to persist state: {}", self.id, e);
        }
    }

    fn state(&self) -> MutexGuard<'_, ThermostatState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::device::{ContentType, Endpoint, MockTransport, Payload};
    use crate::store::PersistedState;

    fn endpoint(url: &str, method: Method) -> Endpoint {
        Endpoint {
            url: url.to_string(),
            method,
            token: None,
            content_type: ContentType::Json,
            body_key: None,
        }
    }

    fn set_endpoints() -> Endpoints {
        Endpoints {
            get_temperature: None,
            set_temperature: Some(endpoint("http://device.local/set", Method::POST)),
            set_off: Some(endpoint("http://device.local/off", Method::POST)),
        }
    }

    fn get_endpoints() -> Endpoints {
        Endpoints {
            get_temperature: Some(endpoint("http://device.local/temp", Method::GET)),
            set_temperature: None,
            set_off: None,
        }
    }

    fn thermostat(endpoints: Endpoints, dir: &TempDir) -> Thermostat<MockTransport> {
        Thermostat::new(
            "test".to_string(),
            endpoints,
            Duration::from_secs(60),
            MockTransport::new(),
            StateStore::new(dir.path(), "test"),
        )
    }

    fn persisted_on_disk(dir: &TempDir) -> PersistedState {
        let content = std::fs::read_to_string(dir.path().join("test.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_set_mode_off_sends_single_delay_request() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(set_endpoints(), &dir);
        thermostat.initialize().await;

        thermostat.set_target_mode(HeatingMode::Off).await.unwrap();

        let requests = thermostat.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://device.local/off");
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"value":5}"#));
        assert_eq!(thermostat.target_mode(), HeatingMode::Off);
        assert_eq!(thermostat.current_mode(), HeatingMode::Off);
    }

    #[tokio::test]
    async fn test_set_mode_heat_sends_no_request() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(set_endpoints(), &dir);
        thermostat.initialize().await;

        thermostat.set_target_mode(HeatingMode::Heat).await.unwrap();

        assert!(thermostat.transport.requests().is_empty());
        assert_eq!(thermostat.target_mode(), HeatingMode::Heat);
        assert_eq!(persisted_on_disk(&dir).target_mode, HeatingMode::Heat);
    }

    #[tokio::test]
    async fn test_device_error_on_off_keeps_local_mode() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(set_endpoints(), &dir);
        thermostat.initialize().await;
        thermostat.transport.push_json(json!({ "error": "offline" }));

        let result = thermostat.set_target_mode(HeatingMode::Off).await;

        assert!(matches!(result, Err(Error::Device(ref m)) if m == "offline"));
        // The mode was applied and persisted before the device refused.
        assert_eq!(thermostat.target_mode(), HeatingMode::Off);
        assert_eq!(persisted_on_disk(&dir).target_mode, HeatingMode::Off);
    }

    #[tokio::test]
    async fn test_set_temperature_updates_and_persists() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(set_endpoints(), &dir);
        thermostat.initialize().await;
        thermostat.transport.push(Ok(Payload::Text("OK".to_string())));

        thermostat.set_target_temperature(21.5).await.unwrap();

        assert_eq!(thermostat.target_temperature(), 21.5);
        assert_eq!(persisted_on_disk(&dir).target_temperature, 21.5);
        let requests = thermostat.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"value":21.5}"#));
    }

    #[tokio::test]
    async fn test_failed_set_temperature_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(set_endpoints(), &dir);
        thermostat.initialize().await;
        thermostat
            .transport
            .push(Err(Error::Network("connection refused".to_string())));

        let result = thermostat.set_target_temperature(25.0).await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(thermostat.target_temperature(), 19.0);
        // Nothing was accepted, so nothing was persisted.
        assert!(!dir.path().join("test.json").exists());
    }

    #[tokio::test]
    async fn test_current_temperature_unconfigured() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(set_endpoints(), &dir);

        let result = thermostat.current_temperature().await;
        assert!(matches!(result, Err(Error::Unconfigured("get_temperature"))));

        // The engine keeps serving other characteristics.
        assert_eq!(thermostat.target_temperature(), 19.0);
        assert_eq!(thermostat.target_mode(), HeatingMode::Off);
    }

    #[tokio::test]
    async fn test_current_temperature_updates_state() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(get_endpoints(), &dir);
        thermostat
            .transport
            .push_json(json!({ "data": [{ "name": "temp", "value": "21.5" }] }));

        let value = thermostat.current_temperature().await.unwrap();

        assert_eq!(value, 21.5);
        let requests = thermostat.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_reading() {
        let dir = TempDir::new().unwrap();
        let thermostat = thermostat(get_endpoints(), &dir);
        thermostat.transport.push_json(json!({ "temperature": 23.0 }));
        thermostat.current_temperature().await.unwrap();

        thermostat
            .transport
            .push(Err(Error::Network("reset".to_string())));
        assert!(thermostat.current_temperature().await.is_err());

        thermostat.transport.push_json(json!({ "error": "busy" }));
        assert!(matches!(
            thermostat.current_temperature().await,
            Err(Error::Device(_))
        ));

        assert_eq!(thermostat.state().current_temperature, 23.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_does_not_stop_the_loop() {
        let dir = TempDir::new().unwrap();
        let thermostat = Arc::new(thermostat(get_endpoints(), &dir));
        thermostat
            .transport
            .push(Err(Error::Network("down".to_string())));
        thermostat.transport.push_json(json!({ "temperature": 23.5 }));

        let handle = thermostat.clone().spawn_poll_loop();

        // First tick fails; the reading stays at its default.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(thermostat.transport.requests().len(), 1);
        assert_eq!(thermostat.state().current_temperature, 20.0);

        // Second tick recovers.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(thermostat.transport.requests().len(), 2);
        assert_eq!(thermostat.state().current_temperature, 23.5);

        handle.abort();
    }

    #[tokio::test]
    async fn test_initialize_restores_persisted_state() {
        let dir = TempDir::new().unwrap();
        let saved = PersistedState {
            current_temperature: 22.0,
            target_temperature: 21.0,
            target_mode: HeatingMode::Heat,
        };
        std::fs::write(
            dir.path().join("test.json"),
            serde_json::to_string(&saved).unwrap(),
        )
        .unwrap();

        let thermostat = thermostat(set_endpoints(), &dir);
        thermostat.initialize().await;

        assert_eq!(thermostat.target_temperature(), 21.0);
        assert_eq!(thermostat.target_mode(), HeatingMode::Heat);
        assert_eq!(thermostat.state().current_temperature, 22.0);
    }
}
