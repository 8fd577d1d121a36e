//! Pipeline hook capabilities.
//!
//! Each stage hook is a small trait with a blanket impl for closures, in the
//! same spirit as a before/after middleware: implement the trait on a struct
//! when the hook carries state, pass a closure when it does not.
//!
//! Engine-wide hooks see the input or output as `dyn Any + Send` because the
//! engine does not know endpoint types; endpoint hooks are typed. Engine
//! hooks always run before endpoint hooks, each list in registration order,
//! and the first error aborts the request.

use crate::context::RequestContext;
use crate::errors::Problem;
use crate::request::Request;
use std::any::Any;
use std::sync::Arc;

/// Type-erased input or output seen by engine-wide hooks.
pub type AnyValue = dyn Any + Send;

/// Derives the context later stages see.
pub trait Enricher: Send + Sync {
    fn enrich(&self, ctx: RequestContext, req: &Request) -> anyhow::Result<RequestContext>;
}

impl<F> Enricher for F
where
    F: Fn(RequestContext, &Request) -> anyhow::Result<RequestContext> + Send + Sync,
{
    fn enrich(&self, ctx: RequestContext, req: &Request) -> anyhow::Result<RequestContext> {
        self(ctx, req)
    }
}

/// Inspects or rewrites a bound input or a handler output in place.
pub trait Hook<T: ?Sized>: Send + Sync {
    fn process(&self, ctx: &RequestContext, value: &mut T) -> anyhow::Result<()>;
}

impl<T: ?Sized, F> Hook<T> for F
where
    F: Fn(&RequestContext, &mut T) -> anyhow::Result<()> + Send + Sync,
{
    fn process(&self, ctx: &RequestContext, value: &mut T) -> anyhow::Result<()> {
        self(ctx, value)
    }
}

/// Decides whether the request may reach the handler.
pub trait Policy<T: ?Sized>: Send + Sync {
    fn authorize(&self, ctx: &RequestContext, req: &Request, input: &T) -> anyhow::Result<()>;
}

impl<T: ?Sized, F> Policy<T> for F
where
    F: Fn(&RequestContext, &Request, &T) -> anyhow::Result<()> + Send + Sync,
{
    fn authorize(&self, ctx: &RequestContext, req: &Request, input: &T) -> anyhow::Result<()> {
        self(ctx, req, input)
    }
}

/// Runs an engine-wide hook against a typed value.
pub(crate) struct ErasedHook(pub(crate) Arc<dyn Hook<AnyValue>>);

impl<T: Any + Send> Hook<T> for ErasedHook {
    fn process(&self, ctx: &RequestContext, value: &mut T) -> anyhow::Result<()> {
        self.0.process(ctx, value as &mut AnyValue)
    }
}

/// Runs an engine-wide policy against a typed input.
pub(crate) struct ErasedPolicy(pub(crate) Arc<dyn Policy<AnyValue>>);

impl<T: Any + Send> Policy<T> for ErasedPolicy {
    fn authorize(&self, ctx: &RequestContext, req: &Request, input: &T) -> anyhow::Result<()> {
        self.0.authorize(ctx, req, input as &AnyValue)
    }
}

/// Ready-made policies.
pub mod policies {
    use super::*;

    /// Rejects requests without a non-empty `header` as `unauthorized`.
    #[derive(Debug, Clone)]
    pub struct RequireHeader {
        header: String,
    }

    impl<T: ?Sized> Policy<T> for RequireHeader {
        fn authorize(&self, _ctx: &RequestContext, req: &Request, _input: &T) -> anyhow::Result<()> {
            match req.header(&self.header) {
                Some(v) if !v.trim().is_empty() => Ok(()),
                _ => Err(Problem::unauthorized()
                    .with_message(format!("missing {} header", self.header))
                    .into()),
            }
        }
    }

    pub fn require_header(header: &str) -> RequireHeader {
        RequireHeader {
            header: header.to_ascii_lowercase(),
        }
    }

    /// Rejects requests whose context lacks a `T` value as `forbidden`.
    ///
    /// Pairs with an enricher that inserts `T` (an authenticated principal,
    /// a tenant) after checking credentials.
    pub struct RequireValue<V> {
        _marker: std::marker::PhantomData<fn() -> V>,
    }

    impl<V, T: ?Sized> Policy<T> for RequireValue<V>
    where
        V: Send + Sync + 'static,
    {
        fn authorize(&self, ctx: &RequestContext, _req: &Request, _input: &T) -> anyhow::Result<()> {
            if ctx.value::<V>().is_some() {
                Ok(())
            } else {
                Err(Problem::forbidden().into())
            }
        }
    }

    pub fn require_value<V: Send + Sync + 'static>() -> RequireValue<V> {
        RequireValue {
            _marker: std::marker::PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::policies::{require_header, require_value};
    use super::*;
    use http::Method;

    #[test]
    fn closures_are_hooks() {
        let hook = |_ctx: &RequestContext, n: &mut u32| -> anyhow::Result<()> {
            *n += 1;
            Ok(())
        };
        let mut n = 1u32;
        hook.process(&RequestContext::background(), &mut n).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn erased_hook_downcasts() {
        let inner: Arc<dyn Hook<AnyValue>> =
            Arc::new(|_ctx: &RequestContext, v: &mut AnyValue| -> anyhow::Result<()> {
                if let Some(s) = v.downcast_mut::<String>() {
                    s.push('!');
                }
                Ok(())
            });
        let erased = ErasedHook(inner);
        let mut s = String::from("hi");
        erased.process(&RequestContext::background(), &mut s).unwrap();
        assert_eq!(s, "hi!");
    }

    #[test]
    fn require_header_policy() {
        let policy = require_header("Authorization");
        let ctx = RequestContext::background();
        let bare = Request::new(Method::GET, "/");
        let authed = Request::new(Method::GET, "/").with_header("authorization", "Bearer x");
        assert!(Policy::<()>::authorize(&policy, &ctx, &bare, &()).is_err());
        assert!(Policy::<()>::authorize(&policy, &ctx, &authed, &()).is_ok());
    }

    #[test]
    fn require_value_policy() {
        #[derive(Clone)]
        struct Principal;

        let policy = require_value::<Principal>();
        let req = Request::new(Method::GET, "/");
        let anonymous = RequestContext::background();
        let known = RequestContext::background().with_value(Principal);
        assert!(Policy::<()>::authorize(&policy, &anonymous, &req, &()).is_err());
        assert!(Policy::<()>::authorize(&policy, &known, &req, &()).is_ok());
    }
}
