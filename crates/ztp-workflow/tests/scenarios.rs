//! End-to-end provisioning runs against in-memory collaborators, on a paused
//! clock so every poll tick is deterministic.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ztp_common::{ProvisioningRecord, RecordStatus};
use ztp_gateway::{BitmapKind, GatewayCall, MemoryGateway, Reachability};
use ztp_notify::MemoryNotifier;
use ztp_transfer::MemoryTransferServer;
use ztp_workflow::{
    EngineConfig, MemoryRecordStore, ProvisioningEngine, RunEvent, RunOutcome, StartOptions,
    TaskDispatcher, WaitLimit, WaitLimits, WorkflowStep,
};

const DEVICE: Ipv4Addr = Ipv4Addr::new(10, 90, 0, 5);
const SWITCH: Ipv4Addr = Ipv4Addr::new(10, 90, 0, 1);
const ACCESS_LOG: &str = "/tftp/test.log";
const CHAT: &str = "-100200300";

struct Harness {
    dispatcher: TaskDispatcher,
    gateway: Arc<MemoryGateway>,
    transfer: Arc<MemoryTransferServer>,
    notifier: Arc<MemoryNotifier>,
    store: Arc<MemoryRecordStore>,
}

fn harness(gateway: MemoryGateway, record: ProvisioningRecord, waits: WaitLimits) -> Harness {
    let gateway = Arc::new(gateway);
    let transfer = Arc::new(MemoryTransferServer::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let store = Arc::new(MemoryRecordStore::new());
    store.insert(record);

    let config = EngineConfig::new(waits)
        .with_recipients(vec![CHAT.to_string()])
        .with_management_vlan(100);
    let engine = ProvisioningEngine::new(
        gateway.clone(),
        transfer.clone(),
        notifier.clone(),
        store.clone(),
        config,
    )
    .expect("valid engine config");

    Harness {
        dispatcher: TaskDispatcher::new(Arc::new(engine)),
        gateway,
        transfer,
        notifier,
        store,
    }
}

fn downloaded(transfer: &MemoryTransferServer) {
    transfer.add_file(
        ACCESS_LOG,
        "Oct 18 09:00:01 tftpd[77]: 10.90.0.5 filename firmwares/DES-3200-28_R4.had\n\
         Oct 18 09:00:09 tftpd[77]: 10.90.0.5 filename configs/initial/10.90.0.5.cfg\n",
    );
}

/// Up at 0, rebooting during [1s, 2s), back at 2s
fn reboots_once() -> Reachability {
    Reachability::down_between(Duration::from_secs(1), Duration::from_secs(2))
}

#[tokio::test(start_paused = true)]
async fn test_plain_run_completes_with_one_done_patch() {
    let h = harness(
        MemoryGateway::new().with_reachability(DEVICE, reboots_once()),
        ProvisioningRecord::new(1, DEVICE),
        WaitLimits::uniform(WaitLimit::Seconds(60)),
    );
    downloaded(&h.transfer);

    let run = h
        .dispatcher
        .start_record(1, StartOptions::default())
        .await
        .unwrap();
    assert_eq!(h.dispatcher.wait(&run).await, Some(RunOutcome::Completed));

    let done_patches = h
        .store
        .patches()
        .into_iter()
        .filter(|(_, patch)| patch.status == Some(RecordStatus::Done))
        .count();
    assert_eq!(done_patches, 1);

    let record = h.store.record(1).unwrap();
    assert_eq!(record.status, RecordStatus::Done);
    assert!(record.task_handle.is_none());
    assert!(record.started_at.is_some());
    assert!(record.finished_at.is_some());

    // no VLAN traffic without auto VLANs
    assert!(h
        .gateway
        .calls()
        .iter()
        .all(|call| matches!(call, GatewayCall::Probe { .. })));

    let deliveries = h.notifier.deliveries();
    let last = deliveries.last().unwrap().text();
    assert!(last.contains("ZTP 10.90.0.5: done"));
    assert!(!last.contains('⏳'));
}

#[tokio::test(start_paused = true)]
async fn test_auto_vlan_run_restores_upstream_and_pushes_config() {
    // 24-port switch, upstream port 24 untagged in VLAN 30 and tagged in 40
    let gateway = MemoryGateway::new()
        .with_vlan(SWITCH, 1, "0xffff00", "0xffff00")
        .with_vlan(SWITCH, 30, "0x000001", "0x000001")
        .with_vlan(SWITCH, 40, "0x000001", "0x000000")
        .with_vlan(SWITCH, 100, "0x000000", "0x000000")
        .with_port_description(SWITCH, 24, "uplink to sw-new")
        .with_reachability(DEVICE, reboots_once());
    let record = ProvisioningRecord::new(7, DEVICE)
        .with_upstream(SWITCH, 24)
        .with_autochange_vlans(true);
    let h = harness(gateway, record, WaitLimits::uniform(WaitLimit::Forever));
    downloaded(&h.transfer);
    h.transfer
        .add_file("/configs/full/access.cfg", "config snmp system_name sw-new\r\n");
    let mut events = h.dispatcher.engine().subscribe();

    let options = StartOptions {
        push_full_config: true,
        full_config_filename: Some("access.cfg".to_string()),
        full_config_commands: vec!["save".to_string()],
        ..Default::default()
    };
    let run = h.dispatcher.start_record(7, options).await.unwrap();
    assert_eq!(h.dispatcher.wait(&run).await, Some(RunOutcome::Completed));

    let bitmap = |vlan, kind| h.gateway.bitmap(SWITCH, vlan, kind).unwrap();
    assert_eq!(bitmap(30, BitmapKind::AllPorts), "000001");
    assert_eq!(bitmap(30, BitmapKind::UntaggedPorts), "000001");
    assert_eq!(bitmap(40, BitmapKind::AllPorts), "0x000001");
    assert_eq!(bitmap(100, BitmapKind::AllPorts), "000001");
    assert_eq!(bitmap(100, BitmapKind::UntaggedPorts), "000000");

    let batches = h.gateway.batches(DEVICE);
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![
            "disable syslog",
            "disable clipaging",
            "config snmp system_name sw-new",
            "save",
            "enable clipaging",
            "enable syslog",
        ]
    );

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::StepStarted { step, .. } = event {
            started.push(step);
        }
    }
    assert_eq!(
        started,
        vec![
            WorkflowStep::Start,
            WorkflowStep::AutoVlanPrep,
            WorkflowStep::WaitUp,
            WorkflowStep::WaitDownloadComplete,
            WorkflowStep::AutoVlanRestore,
            WorkflowStep::WaitRebooted,
            WorkflowStep::PushConfig,
            WorkflowStep::Done,
        ]
    );

    let last = h.notifier.deliveries().last().unwrap().text().to_string();
    assert_eq!(last.lines().count(), 9);
    assert!(last.contains("VLAN 100 tagged"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_waiting_for_device_goes_quiet() {
    let h = harness(
        MemoryGateway::new().with_reachability(DEVICE, Reachability::Fixed(false)),
        ProvisioningRecord::new(3, DEVICE),
        WaitLimits::uniform(WaitLimit::Forever),
    );

    let run = h
        .dispatcher
        .start_record(3, StartOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert!(h.dispatcher.is_running(&run));

    h.dispatcher.stop_record(3).await.unwrap();
    let calls = h.gateway.call_count();
    let deliveries = h.notifier.delivery_count();
    assert!(calls >= 5);

    assert_eq!(h.dispatcher.wait(&run).await, Some(RunOutcome::Cancelled));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.gateway.call_count(), calls);
    assert_eq!(h.notifier.delivery_count(), deliveries);

    let record = h.store.record(3).unwrap();
    assert_eq!(record.status, RecordStatus::Waiting);
    assert!(record.task_handle.is_none());
    assert!(record.started_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_full_config_fails_run() {
    let h = harness(
        MemoryGateway::new().with_reachability(DEVICE, reboots_once()),
        ProvisioningRecord::new(4, DEVICE),
        WaitLimits::uniform(WaitLimit::Forever),
    );
    downloaded(&h.transfer);

    let options = StartOptions {
        push_full_config: true,
        full_config_filename: Some("absent.cfg".to_string()),
        ..Default::default()
    };
    let run = h.dispatcher.start_record(4, options).await.unwrap();

    match h.dispatcher.wait(&run).await {
        Some(RunOutcome::Failed(reason)) => assert!(reason.contains("absent.cfg")),
        other => panic!("expected a failed run, got {other:?}"),
    }
    // the record is left for an operator to look at
    assert_eq!(h.store.record(4).unwrap().status, RecordStatus::InProgress);
    assert!(h.gateway.batches(DEVICE).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_rejects_auto_vlan_record_without_upstream() {
    let record = ProvisioningRecord::new(5, DEVICE).with_autochange_vlans(true);
    let h = harness(MemoryGateway::new(), record, WaitLimits::uniform(WaitLimit::Forever));

    assert!(h
        .dispatcher
        .start_record(5, StartOptions::default())
        .await
        .is_err());
    assert!(h.store.patches().is_empty());
    assert_eq!(h.gateway.call_count(), 0);
    assert!(h.dispatcher.active_runs().is_empty());
}
