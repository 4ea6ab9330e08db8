use dock_core::{
    Action, ActionDispatcher, ActionOutcome, ContainerState, Error, ResourceCache, ResourceKind,
    View, ViewState,
};

use crate::common::{container, FakeEngine};

async fn detail_view_of(cache: &ResourceCache, id: &str) -> ViewState {
    cache.refresh(&ResourceKind::Containers { all: true }).await.unwrap();
    cache
        .refresh(&ResourceKind::Detail { id: id.to_string() })
        .await
        .unwrap();
    let mut view = ViewState::default();
    view.open_details(id);
    view
}

#[tokio::test]
async fn test_lifecycle_action_refreshes_once() {
    let engine = FakeEngine::with(|s| {
        s.containers = vec![container("web", ContainerState::Running)];
    });
    let dispatcher = ActionDispatcher::new(ResourceCache::new(engine.clone()));
    let mut view = ViewState::default();

    for action in [Action::Stop, Action::Start, Action::Restart, Action::Pause, Action::Unpause] {
        let outcome = dispatcher
            .apply(action, "web", &mut view, |_| panic!("no confirmation expected"))
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Applied);
    }

    assert_eq!(engine.count("stop_container"), 1);
    assert_eq!(engine.count("start_container"), 1);
    assert_eq!(engine.count("restart_container"), 1);
    assert_eq!(engine.count("pause_container"), 1);
    assert_eq!(engine.count("unpause_container"), 1);
    assert_eq!(engine.count("list_containers"), 5);
}

#[tokio::test]
async fn test_refresh_uses_current_list_filter() {
    let engine = FakeEngine::with(|s| {
        s.containers = vec![container("web", ContainerState::Running)];
    });
    let dispatcher = ActionDispatcher::new(ResourceCache::new(engine.clone()));
    let mut view = ViewState {
        show_all: false,
        ..ViewState::default()
    };

    dispatcher
        .apply(Action::Stop, "web", &mut view, |_| true)
        .await
        .unwrap();
    assert_eq!(engine.state().list_args, vec![false]);
}

#[tokio::test]
async fn test_remove_from_detail_view_returns_to_list() {
    let engine = FakeEngine::with(|s| {
        s.containers = vec![
            container("web", ContainerState::Exited),
            container("db", ContainerState::Running),
        ];
    });
    let cache = ResourceCache::new(engine.clone());
    let dispatcher = ActionDispatcher::new(cache.clone());
    let mut view = detail_view_of(&cache, "web").await;

    let mut asked = None;
    let outcome = dispatcher
        .apply(Action::Remove, "web", &mut view, |id| {
            asked = Some(id.to_string());
            true
        })
        .await
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Applied);
    assert_eq!(asked.as_deref(), Some("web"));
    assert_eq!(engine.state().removed, vec![("web".to_string(), false)]);
    assert_eq!(view.current, View::List);
    assert!(view.selected.is_none());
    assert!(cache.detail("web").await.is_none());

    let list = cache.containers(true).await.unwrap();
    assert_eq!(list.data.len(), 1);
    assert_eq!(list.data[0].id, "db");
}

#[tokio::test]
async fn test_failed_remove_leaves_view_alone() {
    let engine = FakeEngine::with(|s| {
        s.containers = vec![container("web", ContainerState::Running)];
        s.remove_error = Some(Error::operation(
            "remove container",
            "container is running",
        ));
    });
    let cache = ResourceCache::new(engine.clone());
    let dispatcher = ActionDispatcher::new(cache.clone());
    let mut view = detail_view_of(&cache, "web").await;
    let lists_before = engine.count("list_containers");

    let err = dispatcher
        .apply(Action::Remove, "web", &mut view, |_| true)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Operation { .. }));
    assert_eq!(view.current, View::Details);
    assert_eq!(view.selected.as_deref(), Some("web"));
    assert!(cache.detail("web").await.is_some());
    assert_eq!(engine.count("list_containers"), lists_before + 1);
}

#[tokio::test]
async fn test_declined_remove_makes_no_engine_call() {
    let engine = FakeEngine::with(|s| {
        s.containers = vec![container("web", ContainerState::Exited)];
    });
    let cache = ResourceCache::new(engine.clone());
    let dispatcher = ActionDispatcher::new(cache.clone());
    let mut view = detail_view_of(&cache, "web").await;
    let lists_before = engine.count("list_containers");

    let outcome = dispatcher
        .apply(Action::Remove, "web", &mut view, |_| false)
        .await
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Declined);
    assert_eq!(engine.count("remove_container"), 0);
    assert_eq!(view.selected.as_deref(), Some("web"));
    assert_eq!(engine.count("list_containers"), lists_before + 1);
}
