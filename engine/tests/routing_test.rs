//! Weighted routing through rule and chain entities.

mod common;

use common::{
    InMemoryChainSource, InMemoryRuleSource, RuleBehavior,
    ScriptedProcessor, active_rule, chain_def, counted_msg, start_system,
};

use engine::{
    ComponentLifecycleEvent, EngineConfig, InMemoryMsgQueueService,
    MsgQueueService, QueueKey, RootChainDispatcher, RuleChainManager,
    RuleManager, TenantId,
};

use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use std::sync::{Arc, atomic::Ordering};

#[tokio::test]
async fn test_forward_walks_chain_in_weight_order() {
    let system = start_system();
    let tenant = TenantId::random();
    let source = Arc::new(InMemoryRuleSource::new());
    let first = active_rule(tenant, 1);
    let second = active_rule(tenant, 2);
    source.put(first.clone());
    source.put(second.clone());

    let processor = Arc::new(ScriptedProcessor::new());
    processor.script(first.id, RuleBehavior::Forward);
    processor.script(second.id, RuleBehavior::Complete);

    let config = EngineConfig::default();
    let manager = RuleManager::tenant(
        tenant,
        source,
        processor.clone(),
        system,
        &config,
    );
    let chain = manager.get_rule_chain().await.unwrap();
    let entry = chain.first().unwrap();
    assert_eq!(entry.id, first.id);

    let (msg, callback) = counted_msg();
    entry.handle.tell(msg).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // One terminal outcome, after both rules processed in weight order.
    assert_eq!(callback.acks.load(Ordering::SeqCst), 1);
    assert_eq!(callback.fails.load(Ordering::SeqCst), 0);
    let rule_order: Vec<_> =
        processor.processed().iter().map(|(r, _)| *r).collect();
    assert_eq!(rule_order, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_forward_at_end_of_chain_acks() {
    let system = start_system();
    let tenant = TenantId::random();
    let source = Arc::new(InMemoryRuleSource::new());
    let only = active_rule(tenant, 1);
    source.put(only.clone());

    let processor = Arc::new(ScriptedProcessor::new());
    processor.script(only.id, RuleBehavior::Forward);

    let config = EngineConfig::default();
    let manager =
        RuleManager::tenant(tenant, source, processor, system, &config);
    let chain = manager.get_rule_chain().await.unwrap();

    let (msg, callback) = counted_msg();
    chain.first().unwrap().handle.tell(msg).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(callback.acks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_rule_fails_the_message() {
    let system = start_system();
    let tenant = TenantId::random();
    let source = Arc::new(InMemoryRuleSource::new());
    let only = active_rule(tenant, 1);
    source.put(only.clone());

    let processor = Arc::new(ScriptedProcessor::new());
    processor.script(only.id, RuleBehavior::Fail);

    let config = EngineConfig::default();
    let manager =
        RuleManager::tenant(tenant, source, processor, system, &config);
    let chain = manager.get_rule_chain().await.unwrap();

    let (msg, callback) = counted_msg();
    chain.first().unwrap().handle.tell(msg).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(callback.acks.load(Ordering::SeqCst), 0);
    assert_eq!(callback.fails.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_chain_actor_dispatches_into_rules() {
    let system = start_system();
    let tenant = TenantId::random();

    let rule_source = Arc::new(InMemoryRuleSource::new());
    let rule = active_rule(tenant, 1);
    rule_source.put(rule.clone());
    let processor = Arc::new(ScriptedProcessor::new());
    let config = EngineConfig::default();
    let rule_manager = RuleManager::tenant(
        tenant,
        rule_source,
        processor.clone(),
        system.clone(),
        &config,
    );
    rule_manager.init().await.unwrap();

    let chain_source = Arc::new(InMemoryChainSource::new());
    let root_def = chain_def(tenant, true);
    chain_source.put(root_def.clone());
    let chain_manager = RuleChainManager::tenant(
        tenant,
        chain_source,
        rule_manager.chain_cell(),
        system,
        &config,
    );
    chain_manager.init().await.unwrap();

    let root = chain_manager.get_root_chain_actor().await.unwrap();
    let (msg, callback) = counted_msg();
    root.tell(msg).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(callback.acks.load(Ordering::SeqCst), 1);
    assert_eq!(processor.processed().len(), 1);
}

#[tokio::test]
async fn test_chain_actor_acks_when_no_active_rules() {
    let system = start_system();
    let tenant = TenantId::random();

    let rule_source = Arc::new(InMemoryRuleSource::new());
    let processor = Arc::new(ScriptedProcessor::new());
    let config = EngineConfig::default();
    let rule_manager = RuleManager::tenant(
        tenant,
        rule_source,
        processor,
        system.clone(),
        &config,
    );
    rule_manager.init().await.unwrap();

    let chain_source = Arc::new(InMemoryChainSource::new());
    chain_source.put(chain_def(tenant, true));
    let chain_manager = RuleChainManager::tenant(
        tenant,
        chain_source,
        rule_manager.chain_cell(),
        system,
        &config,
    );

    chain_manager.init().await.unwrap();
    let root = chain_manager.get_root_chain_actor().await.unwrap();
    let (msg, callback) = counted_msg();
    root.tell(msg).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // Empty chain still yields a terminal outcome.
    assert_eq!(callback.acks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_queue_to_root_chain_end_to_end() {
    let system = start_system();
    let tenant = TenantId::random();
    let config = EngineConfig {
        poll_interval_ms: 10,
        special_tenants: vec![tenant],
        ..EngineConfig::default()
    };

    let rule_source = Arc::new(InMemoryRuleSource::new());
    let rule = active_rule(tenant, 1);
    rule_source.put(rule.clone());
    let processor = Arc::new(ScriptedProcessor::new());
    let rule_manager = RuleManager::tenant(
        tenant,
        rule_source,
        processor.clone(),
        system.clone(),
        &config,
    );
    rule_manager.init().await.unwrap();

    let chain_source = Arc::new(InMemoryChainSource::new());
    chain_source.put(chain_def(tenant, true));
    let chain_manager = Arc::new(RuleChainManager::tenant(
        tenant,
        chain_source,
        rule_manager.chain_cell(),
        system,
        &config,
    ));
    chain_manager.init().await.unwrap();

    let dispatcher = Arc::new(RootChainDispatcher::new());
    dispatcher.register(tenant, chain_manager);
    let service = InMemoryMsgQueueService::new(
        &config,
        dispatcher,
        CancellationToken::new(),
    )
    .unwrap();

    let mut callbacks = Vec::new();
    for _ in 0..2 {
        let (msg, callback) = counted_msg();
        callbacks.push(callback);
        service.add(msg, tenant);
    }
    sleep(Duration::from_millis(200)).await;

    // Both members ran through the root chain and completed their pack.
    assert_eq!(processor.processed().len(), 2);
    for callback in &callbacks {
        assert_eq!(callback.acks.load(Ordering::SeqCst), 1);
    }
    assert!(!service.in_flight(QueueKey::Tenant(tenant)));
}

#[tokio::test]
async fn test_unregistered_tenant_fails_members() {
    let tenant = TenantId::random();
    let config = EngineConfig {
        poll_interval_ms: 10,
        special_tenants: vec![tenant],
        ..EngineConfig::default()
    };
    let service = InMemoryMsgQueueService::new(
        &config,
        Arc::new(RootChainDispatcher::new()),
        CancellationToken::new(),
    )
    .unwrap();

    let (msg, callback) = counted_msg();
    service.add(msg, tenant);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(callback.fails.load(Ordering::SeqCst), 1);
    assert!(!service.in_flight(QueueKey::Tenant(tenant)));
}

#[tokio::test]
async fn test_root_pointer_follows_lifecycle() {
    let system = start_system();
    let tenant = TenantId::random();
    let rule_source = Arc::new(InMemoryRuleSource::new());
    let processor = Arc::new(ScriptedProcessor::new());
    let config = EngineConfig::default();
    let rule_manager = RuleManager::tenant(
        tenant,
        rule_source,
        processor,
        system.clone(),
        &config,
    );
    rule_manager.init().await.unwrap();

    let chain_source = Arc::new(InMemoryChainSource::new());
    let ordinary = chain_def(tenant, false);
    let root_def = chain_def(tenant, true);
    chain_source.put(ordinary);
    chain_source.put(root_def.clone());

    let chain_manager = RuleChainManager::tenant(
        tenant,
        chain_source,
        rule_manager.chain_cell(),
        system,
        &config,
    );
    chain_manager.init().await.unwrap();

    let root = chain_manager.get_root_chain().await.unwrap();
    assert_eq!(root.id, root_def.id);

    chain_manager
        .update(root_def.id, ComponentLifecycleEvent::Deleted)
        .await
        .unwrap();
    assert!(chain_manager.get_root_chain().await.is_none());
    assert!(chain_manager.get_root_chain_actor().await.is_none());
}
