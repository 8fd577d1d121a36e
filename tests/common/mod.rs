#![allow(dead_code)]

pub mod access {
    use declarest::AccessEntry;
    use std::sync::{Arc, Mutex};

    /// Access logger that keeps every entry for later assertions.
    #[derive(Clone, Default)]
    pub struct CollectingLogger {
        entries: Arc<Mutex<Vec<AccessEntry>>>,
    }

    impl CollectingLogger {
        pub fn entries(&self) -> Vec<AccessEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl declarest::AccessLogger for CollectingLogger {
        fn log(&self, entry: &AccessEntry) {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

pub mod harness {
    use super::access::CollectingLogger;
    use declarest::{
        BufferedResponse, Endpoint, Engine, EngineConfig, Bindable, Request, RequestContext,
        Router,
    };
    use serde::Serialize;

    /// An engine whose only access logger is the returned collector.
    pub fn engine_with_logger(config: EngineConfig) -> (Engine, CollectingLogger) {
        let logger = CollectingLogger::default();
        let mut engine = Engine::new(config);
        engine.clear_access_loggers();
        engine.add_access_logger(logger.clone());
        (engine, logger)
    }

    /// Mounts a single endpoint on a fresh router.
    pub fn router_for<I, O>(engine: &Engine, endpoint: Endpoint<I, O>) -> Router
    where
        I: Bindable + Default + Send + 'static,
        O: Serialize + Send + 'static,
    {
        let mut router = Router::new();
        engine.mount(&mut router, endpoint).unwrap();
        router
    }

    /// Dispatches `req` and returns what the endpoint wrote.
    pub fn call(router: &Router, req: Request) -> BufferedResponse {
        call_with(router, RequestContext::background(), req)
    }

    pub fn call_with(router: &Router, ctx: RequestContext, req: Request) -> BufferedResponse {
        let mut res = BufferedResponse::new();
        assert!(
            router.dispatch(ctx, req, &mut res),
            "request did not match any route"
        );
        res
    }
}

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            declarest::RuntimeConfig::default().apply();
        });
    }
}
