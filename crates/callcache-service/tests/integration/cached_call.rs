use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use callcache_service::caching::{
    CacheBackend, CachedCall, CallError, CallGroup, Code, Session, Status,
};
use callcache_service::config::Config;
use callcache_test::{CreateDemoRequest, Demo};

use crate::{Invocations, setup_backend};

/// Issues a `CreateDemo` call, whose remote side answers with `result` after a short delay.
fn create_demo(
    config: &Config,
    backend: &Arc<dyn CacheBackend>,
    group: &CallGroup<CreateDemoRequest, Demo>,
    invocations: &Invocations,
    request: CreateDemoRequest,
    result: Result<Demo, Status>,
) -> impl Future<Output = Result<Demo, CallError<Status>>> + Send + 'static {
    let invocations = invocations.clone();
    let compute = move || async move {
        invocations.inc();
        tokio::time::sleep(Duration::from_millis(50)).await;
        result
    };

    let call = CachedCall::new(
        Arc::clone(backend),
        compute,
        Session::new(request),
        group.clone(),
        config.caches.ttl,
    )
    .cacheable_errors([Status::not_found("no such demo")]);

    let call = match &config.caches.namespace {
        Some(namespace) => call.namespace(namespace),
        None => call,
    };
    call.get()
}

#[tokio::test]
async fn test_cached_response() {
    let (config, backend) = setup_backend("caches:\n  ttl: 1m");
    let group = CallGroup::default();
    let invocations = Invocations::default();

    let request = CreateDemoRequest::new("x");
    let first = create_demo(
        &config,
        &backend,
        &group,
        &invocations,
        request.clone(),
        Ok(Demo::named("haha")),
    )
    .await;
    assert_eq!(first, Ok(Demo::named("haha")));

    let second = create_demo(
        &config,
        &backend,
        &group,
        &invocations,
        request,
        Ok(Demo::named("fresh")),
    )
    .await;
    assert_eq!(second, Ok(Demo::named("haha")));
    assert_eq!(invocations.get(), 1);
}

#[tokio::test]
async fn test_expired_response() {
    let (config, backend) = setup_backend("caches:\n  ttl: 100ms");
    let group = CallGroup::default();
    let invocations = Invocations::default();

    let request = CreateDemoRequest::new("x");
    let first = create_demo(
        &config,
        &backend,
        &group,
        &invocations,
        request.clone(),
        Ok(Demo::named("first")),
    )
    .await;
    assert_eq!(first, Ok(Demo::named("first")));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = create_demo(
        &config,
        &backend,
        &group,
        &invocations,
        request,
        Ok(Demo::named("second")),
    )
    .await;
    assert_eq!(second, Ok(Demo::named("second")));
    assert_eq!(invocations.get(), 2);
}

#[tokio::test]
async fn test_cached_errors() {
    let (config, backend) = setup_backend("caches:\n  ttl: 1m");
    let group = CallGroup::default();
    let invocations = Invocations::default();

    // `NotFound` is cacheable, and replayed from the cache
    let missing = CreateDemoRequest::new("missing");
    let not_found = Status::not_found("no such demo");
    for _ in 0..3 {
        create_demo(
            &config,
            &backend,
            &group,
            &invocations,
            missing.clone(),
            Err(not_found.clone()),
        )
        .await
        .unwrap_err();
    }
    assert_eq!(invocations.get(), 1);

    let replayed = create_demo(
        &config,
        &backend,
        &group,
        &invocations,
        missing,
        Ok(Demo::named("haha")),
    )
    .await;
    assert_eq!(replayed, Err(CallError::Cached(not_found)));

    // `Unavailable` is not, so every call reaches the remote side
    let flaky = CreateDemoRequest::new("flaky");
    let unavailable = Status::new(Code::Unavailable, "try again later");
    for _ in 0..3 {
        let result = create_demo(
            &config,
            &backend,
            &group,
            &invocations,
            flaky.clone(),
            Err(unavailable.clone()),
        )
        .await;
        assert_eq!(result, Err(CallError::Remote(unavailable.clone())));
    }
    assert_eq!(invocations.get(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls() {
    let (config, backend) = setup_backend("caches:\n  ttl: 1m");
    let group = CallGroup::default();
    let invocations = Invocations::default();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            tokio::spawn(create_demo(
                &config,
                &backend,
                &group,
                &invocations,
                CreateDemoRequest::new("x"),
                Ok(Demo::named(format!("demo-{i}"))),
            ))
        })
        .collect();

    let mut responses = Vec::new();
    for task in tasks {
        responses.push(task.await.unwrap().unwrap());
    }

    assert_eq!(invocations.get(), 1);
    assert!(responses.iter().all(|response| response == &responses[0]));
}

#[tokio::test]
async fn test_namespaces() {
    let (create_config, backend) =
        setup_backend("caches:\n  namespace: demo.v1.DemoService/CreateDemo");
    let get_config =
        Config::from_reader("caches:\n  namespace: demo.v1.DemoService/GetDemo".as_bytes())
            .unwrap();
    let group = CallGroup::default();
    let invocations = Invocations::default();

    let request = CreateDemoRequest::new("x");
    let created = create_demo(
        &create_config,
        &backend,
        &group,
        &invocations,
        request.clone(),
        Ok(Demo::named("created")),
    )
    .await;
    let fetched = create_demo(
        &get_config,
        &backend,
        &group,
        &invocations,
        request,
        Ok(Demo::named("fetched")),
    )
    .await;

    assert_eq!(created, Ok(Demo::named("created")));
    assert_eq!(fetched, Ok(Demo::named("fetched")));
    assert_eq!(invocations.get(), 2);
}
