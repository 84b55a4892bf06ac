//! Unit tests for the readiness gate

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_utils::*;
    use bigip_client::{MockBigIpConnector, MockFailure, RecordedCall};
    use openstack_client::{MockComputeClient, STATUS_ACTIVE};

    const PRIMARY_ADDR: &str = "10.0.0.5";
    const SECONDARY_ADDR: &str = "10.0.0.6";

    fn compute_with_instances(policy: &BootstrapPolicy) -> MockComputeClient {
        let compute = create_test_compute();
        for index in 0..policy.members.len() {
            compute.add_instance(create_test_instance(policy, index, STATUS_ACTIVE));
        }
        compute
    }

    fn addressed_run(policy: &BootstrapPolicy) -> BootstrapRun {
        let mut run = BootstrapRun::new(policy);
        run.members[0].management_address = Some(PRIMARY_ADDR.to_string());
        run.members[1].management_address = Some(SECONDARY_ADDR.to_string());
        run
    }

    fn failover_calls(connector: &MockBigIpConnector, address: &str) -> usize {
        connector
            .calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::GetFailoverState { address: a } if a == address))
            .count()
    }

    #[tokio::test]
    async fn test_addresses_after_n_polls_takes_n_polls() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = compute_with_instances(&policy);
        compute.assign_address_after(3, "demo_1", MGMT_LABEL, PRIMARY_ADDR);
        compute.assign_address_after(3, "demo_2", MGMT_LABEL, SECONDARY_ADDR);
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::open();
        let config = fast_config();
        let cancel = CancellationToken::new();
        let mut run = BootstrapRun::new(&policy);

        ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_addresses(&policy, &mut run)
            .await
            .unwrap();

        assert_eq!(compute.list_calls(), 3);
        assert_eq!(run.members[0].management_address.as_deref(), Some(PRIMARY_ADDR));
        assert_eq!(run.members[1].management_address.as_deref(), Some(SECONDARY_ADDR));
    }

    #[tokio::test]
    async fn test_address_timeout_names_missing_members() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = compute_with_instances(&policy);
        compute.assign_address_after(1, "demo_1", MGMT_LABEL, PRIMARY_ADDR);
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::open();
        let config = BootstrapConfig {
            address_deadline: Duration::from_millis(200),
            ..fast_config()
        };
        let cancel = CancellationToken::new();
        let mut run = BootstrapRun::new(&policy);

        let err = ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_addresses(&policy, &mut run)
            .await
            .unwrap_err();

        match err {
            BootstrapError::AddressTimeout { missing, .. } => {
                assert_eq!(missing, vec!["demo_2".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(compute.list_calls() > 1);
    }

    #[tokio::test]
    async fn test_stale_primary_tag_aborts_address_wait() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = create_test_compute();
        let mut primary = create_test_instance(&policy, 0, STATUS_ACTIVE);
        primary.metadata.insert(PRIMARY_DEVICE_KEY.to_string(), "false".to_string());
        let mut secondary = create_test_instance(&policy, 1, STATUS_ACTIVE);
        secondary.metadata.insert(PRIMARY_DEVICE_KEY.to_string(), "true".to_string());
        compute.add_instance(primary);
        compute.add_instance(secondary);
        compute.assign_address_after(1, "demo_1", MGMT_LABEL, PRIMARY_ADDR);
        compute.assign_address_after(1, "demo_2", MGMT_LABEL, SECONDARY_ADDR);
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::open();
        let config = fast_config();
        let cancel = CancellationToken::new();
        let mut run = BootstrapRun::new(&policy);

        let err = ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_addresses(&policy, &mut run)
            .await
            .unwrap_err();

        match err {
            BootstrapError::PrimaryMismatch { instance, tagged, primary } => {
                assert_eq!(instance, "demo_1");
                assert_eq!(tagged, "secondary");
                assert_eq!(primary, "demo_1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(compute.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_management_network_fails_resolution() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = MockComputeClient::new();
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::open();
        let config = fast_config();
        let cancel = CancellationToken::new();
        let mut run = BootstrapRun::new(&policy);

        let err = ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_addresses(&policy, &mut run)
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Resolution { kind: "network", .. }));
        assert_eq!(compute.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_control_plane_retries_refused_connections() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = MockComputeClient::new();
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::refusing(2);
        let config = fast_config();
        let cancel = CancellationToken::new();
        let mut run = addressed_run(&policy);

        ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_control_plane(&policy, &mut run)
            .await
            .unwrap();

        assert_eq!(probe.attempts(), 3);
        assert_eq!(run.members[0].control_plane, ControlPlaneState::Ready);
        assert_eq!(connector.connects(), vec![PRIMARY_ADDR.to_string()]);
    }

    #[tokio::test]
    async fn test_control_plane_retries_unavailable_api() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = MockComputeClient::new();
        let connector = MockBigIpConnector::new();
        connector.set_failover_script(
            PRIMARY_ADDR,
            vec![
                Err(MockFailure::Unavailable("not licensed".to_string())),
                Ok("offline".to_string()),
                Ok("standby".to_string()),
            ],
        );
        let probe = ScriptedProbe::open();
        let config = fast_config();
        let cancel = CancellationToken::new();
        let mut run = addressed_run(&policy);

        ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_control_plane(&policy, &mut run)
            .await
            .unwrap();

        assert_eq!(failover_calls(&connector, PRIMARY_ADDR), 3);
        assert_eq!(run.members[0].control_plane, ControlPlaneState::Ready);
    }

    #[tokio::test]
    async fn test_control_plane_timeout_reports_endpoints() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = MockComputeClient::new();
        let connector = MockBigIpConnector::new();
        connector.set_failover_script(
            PRIMARY_ADDR,
            vec![Err(MockFailure::Unavailable("not licensed".to_string()))],
        );
        let probe = ScriptedProbe::open();
        let config = BootstrapConfig {
            control_plane_deadline: Duration::from_millis(300),
            ..fast_config()
        };
        let cancel = CancellationToken::new();
        let mut run = addressed_run(&policy);

        let err = ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_control_plane(&policy, &mut run)
            .await
            .unwrap_err();

        match err {
            BootstrapError::ReadinessTimeout { primary, endpoints, .. } => {
                assert_eq!(primary, "demo_1");
                assert_eq!(
                    endpoints,
                    vec![
                        ("demo_1".to_string(), PRIMARY_ADDR.to_string()),
                        ("demo_2".to_string(), SECONDARY_ADDR.to_string()),
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(failover_calls(&connector, PRIMARY_ADDR) > 1);
        assert!(connector.mutating_calls().is_empty());
        assert_eq!(run.members[0].control_plane, ControlPlaneState::Initializing);
    }

    #[tokio::test]
    async fn test_unreachable_port_times_out() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = MockComputeClient::new();
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::refusing(usize::MAX);
        let config = BootstrapConfig {
            control_plane_deadline: Duration::from_millis(200),
            ..fast_config()
        };
        let cancel = CancellationToken::new();
        let mut run = addressed_run(&policy);

        let err = ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_control_plane(&policy, &mut run)
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::ReadinessTimeout { .. }));
        assert!(connector.connects().is_empty(), "no API client before the port opens");
        assert_eq!(run.members[0].control_plane, ControlPlaneState::Unreachable);
    }

    #[tokio::test]
    async fn test_only_primary_is_gated() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = MockComputeClient::new();
        let connector = MockBigIpConnector::new();
        connector.set_failover_state(SECONDARY_ADDR, "offline");
        let probe = ScriptedProbe::open();
        let config = fast_config();
        let cancel = CancellationToken::new();
        let mut run = addressed_run(&policy);

        ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_control_plane(&policy, &mut run)
            .await
            .unwrap();

        assert_eq!(failover_calls(&connector, SECONDARY_ADDR), 0);
        assert_eq!(run.members[1].control_plane, ControlPlaneState::Unknown);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let policy = create_test_policy("demo", "hapair", 2);
        let compute = compute_with_instances(&policy);
        let connector = MockBigIpConnector::new();
        let probe = ScriptedProbe::open();
        let config = BootstrapConfig {
            address_deadline: Duration::from_secs(30),
            ..fast_config()
        };
        let cancel = CancellationToken::new();
        let mut run = BootstrapRun::new(&policy);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = ReadinessGate::new(&compute, &connector, &probe, &config, &cancel)
            .wait_for_addresses(&policy, &mut run)
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Cancelled { phase: "network address wait" }));
    }
}
