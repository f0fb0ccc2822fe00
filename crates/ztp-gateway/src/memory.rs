//! In-memory device gateway
//!
//! Holds VLAN tables, port descriptions and CLI batches per device, and
//! answers reachability probes from a schedule relative to the moment the
//! gateway was created. The schedule reads tokio's clock, so tests running
//! with a paused clock see deterministic timelines.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::gateway::{BitmapKind, DeviceGateway, VlanBitmap};

/// When a simulated device answers probes
#[derive(Clone)]
pub enum Reachability {
    /// Always the same answer
    Fixed(bool),
    /// Answer computed from the time elapsed since the gateway was created
    Script(Arc<dyn Fn(Duration) -> bool + Send + Sync>),
}

impl Reachability {
    /// Reachable from `at` onwards
    pub fn up_from(at: Duration) -> Self {
        Self::script(move |elapsed| elapsed >= at)
    }

    /// Reachable except during `[down, up)`
    pub fn down_between(down: Duration, up: Duration) -> Self {
        Self::script(move |elapsed| elapsed < down || elapsed >= up)
    }

    pub fn script(f: impl Fn(Duration) -> bool + Send + Sync + 'static) -> Self {
        Reachability::Script(Arc::new(f))
    }

    fn at(&self, elapsed: Duration) -> bool {
        match self {
            Reachability::Fixed(up) => *up,
            Reachability::Script(f) => f(elapsed),
        }
    }
}

impl Default for Reachability {
    fn default() -> Self {
        Reachability::Fixed(false)
    }
}

impl fmt::Debug for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Fixed(up) => f.debug_tuple("Fixed").field(up).finish(),
            Reachability::Script(_) => f.write_str("Script(..)"),
        }
    }
}

/// A call made against a [`MemoryGateway`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    PortDescription { device: Ipv4Addr, port: u16 },
    WalkAll { device: Ipv4Addr },
    WalkUntagged { device: Ipv4Addr },
    Set {
        device: Ipv4Addr,
        vlan: u16,
        kind: BitmapKind,
        value: String,
    },
    Probe { device: Ipv4Addr },
    Batch { device: Ipv4Addr, commands: Vec<String> },
}

#[derive(Debug, Default)]
struct DeviceState {
    all_ports: BTreeMap<u16, String>,
    untagged_ports: BTreeMap<u16, String>,
    descriptions: HashMap<u16, String>,
    reachability: Reachability,
    probe_failures: VecDeque<GatewayError>,
    set_failures: VecDeque<GatewayError>,
    batches: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct State {
    devices: HashMap<Ipv4Addr, DeviceState>,
    calls: Vec<GatewayCall>,
}

/// [`DeviceGateway`] over simulated switches
pub struct MemoryGateway {
    started: Instant,
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device<'a>(state: &'a mut State, device: Ipv4Addr) -> &'a mut DeviceState {
        state.devices.entry(device).or_default()
    }

    /// Seed one VLAN's bitmaps, as the device would report them
    pub fn with_vlan(
        self,
        device: Ipv4Addr,
        vlan: u16,
        all_ports: impl Into<String>,
        untagged_ports: impl Into<String>,
    ) -> Self {
        {
            let mut state = self.state();
            let dev = Self::device(&mut state, device);
            dev.all_ports.insert(vlan, all_ports.into());
            dev.untagged_ports.insert(vlan, untagged_ports.into());
        }
        self
    }

    pub fn with_port_description(
        self,
        device: Ipv4Addr,
        port: u16,
        description: impl Into<String>,
    ) -> Self {
        Self::device(&mut self.state(), device)
            .descriptions
            .insert(port, description.into());
        self
    }

    pub fn with_reachability(self, device: Ipv4Addr, reachability: Reachability) -> Self {
        self.set_reachability(device, reachability);
        self
    }

    /// Change a device's probe schedule
    pub fn set_reachability(&self, device: Ipv4Addr, reachability: Reachability) {
        Self::device(&mut self.state(), device).reachability = reachability;
    }

    /// Make the next probe of `device` fail with `error`
    pub fn fail_next_probe(&self, device: Ipv4Addr, error: GatewayError) {
        Self::device(&mut self.state(), device)
            .probe_failures
            .push_back(error);
    }

    /// Make the next bitmap write to `device` fail with `error`
    pub fn fail_next_set(&self, device: Ipv4Addr, error: GatewayError) {
        Self::device(&mut self.state(), device)
            .set_failures
            .push_back(error);
    }

    /// Current value of one bitmap
    pub fn bitmap(&self, device: Ipv4Addr, vlan: u16, kind: BitmapKind) -> Option<String> {
        let state = self.state();
        let dev = state.devices.get(&device)?;
        let table = match kind {
            BitmapKind::AllPorts => &dev.all_ports,
            BitmapKind::UntaggedPorts => &dev.untagged_ports,
        };
        table.get(&vlan).cloned()
    }

    /// CLI batches received by `device`
    pub fn batches(&self, device: Ipv4Addr) -> Vec<Vec<String>> {
        self.state()
            .devices
            .get(&device)
            .map(|dev| dev.batches.clone())
            .unwrap_or_default()
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    fn table(&self, device: Ipv4Addr, kind: BitmapKind) -> Vec<VlanBitmap> {
        let mut state = self.state();
        state.calls.push(match kind {
            BitmapKind::AllPorts => GatewayCall::WalkAll { device },
            BitmapKind::UntaggedPorts => GatewayCall::WalkUntagged { device },
        });
        let Some(dev) = state.devices.get(&device) else {
            return Vec::new();
        };
        let table = match kind {
            BitmapKind::AllPorts => &dev.all_ports,
            BitmapKind::UntaggedPorts => &dev.untagged_ports,
        };
        table
            .iter()
            .map(|(vlan, value)| VlanBitmap::new(*vlan, value.clone()))
            .collect()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGateway")
            .field("devices", &self.state().devices.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeviceGateway for MemoryGateway {
    async fn get_port_description(&self, device: Ipv4Addr, port: u16) -> Result<Option<String>> {
        let mut state = self.state();
        state.calls.push(GatewayCall::PortDescription { device, port });
        Ok(state
            .devices
            .get(&device)
            .and_then(|dev| dev.descriptions.get(&port).cloned()))
    }

    async fn walk_vlan_all_ports(&self, device: Ipv4Addr) -> Result<Vec<VlanBitmap>> {
        Ok(self.table(device, BitmapKind::AllPorts))
    }

    async fn walk_vlan_untagged_ports(&self, device: Ipv4Addr) -> Result<Vec<VlanBitmap>> {
        Ok(self.table(device, BitmapKind::UntaggedPorts))
    }

    async fn set_vlan_bitmap(
        &self,
        device: Ipv4Addr,
        vlan: u16,
        kind: BitmapKind,
        value: &str,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Set {
            device,
            vlan,
            kind,
            value: value.to_string(),
        });
        let dev = Self::device(&mut state, device);
        if let Some(err) = dev.set_failures.pop_front() {
            return Err(err);
        }
        let table = match kind {
            BitmapKind::AllPorts => &mut dev.all_ports,
            BitmapKind::UntaggedPorts => &mut dev.untagged_ports,
        };
        table.insert(vlan, value.to_string());
        Ok(())
    }

    async fn probe_reachability(&self, device: Ipv4Addr) -> Result<bool> {
        let elapsed = self.started.elapsed();
        let mut state = self.state();
        state.calls.push(GatewayCall::Probe { device });
        let dev = Self::device(&mut state, device);
        if let Some(err) = dev.probe_failures.pop_front() {
            return Err(err);
        }
        let up = dev.reachability.at(elapsed);
        debug!(device = %device, elapsed_ms = elapsed.as_millis() as u64, up, "Simulated probe");
        Ok(up)
    }

    async fn send_command_batch(&self, device: Ipv4Addr, commands: &[String]) -> Result<()> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Batch {
            device,
            commands: commands.to_vec(),
        });
        Self::device(&mut state, device)
            .batches
            .push(commands.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWITCH: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    #[tokio::test(start_paused = true)]
    async fn test_scripted_reachability() {
        let gateway =
            MemoryGateway::new().with_reachability(SWITCH, Reachability::up_from(Duration::from_secs(3)));

        assert!(!gateway.probe_reachability(SWITCH).await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!gateway.probe_reachability(SWITCH).await.unwrap());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gateway.probe_reachability(SWITCH).await.unwrap());
        assert_eq!(gateway.call_count(), 3);
    }

    #[test]
    fn test_down_between() {
        let reach = Reachability::down_between(Duration::from_secs(1), Duration::from_secs(2));
        assert!(reach.at(Duration::ZERO));
        assert!(!reach.at(Duration::from_millis(1500)));
        assert!(reach.at(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_probe_failure_injection() {
        let gateway = MemoryGateway::new().with_reachability(SWITCH, Reachability::Fixed(true));
        gateway.fail_next_probe(SWITCH, GatewayError::Timeout("probe".into()));

        assert!(gateway.probe_reachability(SWITCH).await.is_err());
        assert!(gateway.probe_reachability(SWITCH).await.unwrap());
    }

    #[tokio::test]
    async fn test_vlan_tables() {
        let gateway = MemoryGateway::new()
            .with_vlan(SWITCH, 1, "0xff00", "0xff00")
            .with_vlan(SWITCH, 100, "0x0080", "0x0000");

        let all = gateway.walk_vlan_all_ports(SWITCH).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], VlanBitmap::new(100, "0x0080"));

        gateway
            .set_vlan_bitmap(SWITCH, 100, BitmapKind::UntaggedPorts, "0080")
            .await
            .unwrap();
        assert_eq!(
            gateway.bitmap(SWITCH, 100, BitmapKind::UntaggedPorts).as_deref(),
            Some("0080")
        );
        assert!(gateway.walk_vlan_all_ports(Ipv4Addr::new(10, 9, 9, 9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_and_descriptions() {
        let gateway = MemoryGateway::new().with_port_description(SWITCH, 24, "uplink-core");

        assert_eq!(
            gateway.get_port_description(SWITCH, 24).await.unwrap().as_deref(),
            Some("uplink-core")
        );
        assert!(gateway.get_port_description(SWITCH, 1).await.unwrap().is_none());

        let commands = vec!["disable syslog".to_string(), "save".to_string()];
        gateway.send_command_batch(SWITCH, &commands).await.unwrap();
        assert_eq!(gateway.batches(SWITCH), vec![commands]);
    }
}
