//! Rule manager: chain consistency, lifecycle updates and supervision
//! interplay.

mod common;

use common::{
    InMemoryRuleSource, RuleBehavior, ScriptedProcessor, active_rule,
    start_system, telemetry_msg,
};

use engine::{
    ComponentLifecycleEvent, ComponentState, EngineConfig, RuleId,
    RuleManager, TenantId,
};

use tokio::time::{Duration, sleep};
use tracing_test::traced_test;

use std::sync::Arc;

fn manager_fixture(
    weights: &[i32],
) -> (Arc<RuleManager>, Arc<InMemoryRuleSource>, Arc<ScriptedProcessor>, TenantId, Vec<RuleId>)
{
    let system = start_system();
    let tenant = TenantId::random();
    let source = Arc::new(InMemoryRuleSource::new());
    let mut ids = Vec::new();
    for weight in weights {
        let def = active_rule(tenant, *weight);
        ids.push(def.id);
        source.put(def);
    }
    let processor = Arc::new(ScriptedProcessor::new());
    let config = EngineConfig::default();
    let manager = Arc::new(RuleManager::tenant(
        tenant,
        source.clone(),
        processor.clone(),
        system,
        &config,
    ));
    (manager, source, processor, tenant, ids)
}

#[tokio::test]
async fn test_chain_ordered_by_weight_ascending() {
    let (manager, _, _, _, _) = manager_fixture(&[5, 1, 3]);

    // get_rule_chain lazily triggers init.
    let chain = manager.get_rule_chain().await.unwrap();
    let weights: Vec<i32> = chain.iter().map(|e| e.weight).collect();
    assert_eq!(weights, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let (manager, source, _, tenant, _) = manager_fixture(&[1, 2]);
    manager.init().await.unwrap();

    // New source rows are not picked up by a second init.
    source.put(active_rule(tenant, 9));
    manager.init().await.unwrap();
    assert_eq!(manager.get_rule_chain().await.unwrap().len(), 2);
}

#[traced_test]
#[tokio::test]
async fn test_unknown_deletion_is_idempotent() {
    let (manager, _, _, _, _) = manager_fixture(&[1, 2]);
    manager.init().await.unwrap();

    let result = manager
        .update(RuleId::random(), ComponentLifecycleEvent::Deleted)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(manager.get_rule_chain().await.unwrap().len(), 2);
    // Deleting an unknown rule warns; it never errors.
    assert!(logs_contain("already absent on deletion"));
}

#[tokio::test]
async fn test_deletion_drops_rule_and_stops_entity() {
    let (manager, _, _, _, ids) = manager_fixture(&[1, 2]);
    manager.init().await.unwrap();
    let handle = manager
        .get_or_create_rule_actor(ids[0])
        .await
        .unwrap()
        .unwrap();

    manager
        .update(ids[0], ComponentLifecycleEvent::Deleted)
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    let chain = manager.get_rule_chain().await.unwrap();
    assert_eq!(chain.len(), 1);
    assert!(!chain.contains(ids[0]));
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_suspension_excludes_from_chain_but_keeps_entity() {
    let (manager, source, _, tenant, ids) = manager_fixture(&[1, 2]);
    manager.init().await.unwrap();
    let before = manager
        .get_or_create_rule_actor(ids[0])
        .await
        .unwrap()
        .unwrap();

    let mut def = active_rule(tenant, 1);
    def.id = ids[0];
    def.state = ComponentState::Suspended;
    source.put(def.clone());
    manager
        .update(ids[0], ComponentLifecycleEvent::Suspended)
        .await
        .unwrap();

    let chain = manager.get_rule_chain().await.unwrap();
    assert!(!chain.contains(ids[0]));
    assert!(chain.contains(ids[1]));

    // Re-activation brings the same entity back into the chain.
    def.state = ComponentState::Active;
    source.put(def);
    let after = manager
        .update(ids[0], ComponentLifecycleEvent::Activated)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.path(), before.path());
    assert!(!after.is_closed());
    assert!(manager.get_rule_chain().await.unwrap().contains(ids[0]));
}

#[tokio::test]
async fn test_single_creation_under_concurrent_callers() {
    let (manager, _, _, _, ids) = manager_fixture(&[1]);
    let rule_id = ids[0];

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.get_or_create_rule_actor(rule_id).await
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        let actor_ref = handle.await.unwrap().unwrap().unwrap();
        paths.push(actor_ref.path());
    }
    paths.dedup();
    assert_eq!(paths.len(), 1);
    assert_eq!(manager.get_rule_chain().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_rule_returns_absent() {
    let (manager, _, _, _, _) = manager_fixture(&[1]);
    let result = manager
        .get_or_create_rule_actor(RuleId::random())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_restart_budget_then_stop_then_recreate() {
    let (manager, _, processor, _, ids) = manager_fixture(&[1]);
    let rule_id = ids[0];
    processor.script(rule_id, RuleBehavior::Fail);
    manager.init().await.unwrap();
    let handle = manager
        .get_or_create_rule_actor(rule_id)
        .await
        .unwrap()
        .unwrap();

    // Budget is three restarts within the window; three failures keep the
    // same identity alive.
    for _ in 0..3 {
        handle.tell(telemetry_msg()).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_closed());
    }

    // The fourth failure within the window stops the entity.
    handle.tell(telemetry_msg()).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(handle.is_closed());

    // A plain lookup does not resurrect a stopped rule.
    assert!(manager
        .get_or_create_rule_actor(rule_id)
        .await
        .unwrap()
        .is_none());

    // The next lifecycle update re-creates it with the same identity.
    processor.script(rule_id, RuleBehavior::Complete);
    let recreated = manager
        .update(rule_id, ComponentLifecycleEvent::Updated)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recreated.path(), handle.path());
    assert!(!recreated.is_closed());
}
