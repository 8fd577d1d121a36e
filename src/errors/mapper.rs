use super::catalog::{ids, standard_entries, CatalogEntry, CatalogError, ErrorCatalog};
use super::problem::{Describe, Problem};
use crate::binder::{BindError, BodyError, DecodeError};
use arc_swap::ArcSwap;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::sync::Arc;

type Describer = fn(&anyhow::Error) -> Option<&dyn Describe>;
type Matcher = Box<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

struct Rule {
    matches: Matcher,
    entry: Arc<CatalogEntry>,
}

fn find<E>(err: &anyhow::Error) -> Option<&E>
where
    E: StdError + Send + Sync + 'static,
{
    err.downcast_ref::<E>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<E>()))
}

fn any_in_chain<E>(err: &anyhow::Error, pred: impl Fn(&E) -> bool) -> bool
where
    E: StdError + Send + Sync + 'static,
{
    err.downcast_ref::<E>().is_some_and(&pred)
        || err
            .chain()
            .any(|cause| cause.downcast_ref::<E>().is_some_and(&pred))
}

fn describer<E>(err: &anyhow::Error) -> Option<&dyn Describe>
where
    E: Describe + StdError + Send + Sync + 'static,
{
    find::<E>(err).map(|e| e as &dyn Describe)
}

/// The wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Correlation id of the failed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// An error resolved against the catalog.
#[derive(Debug)]
pub struct MappedError {
    pub entry: Arc<CatalogEntry>,
    /// Wire message: the entry default unless the error overrode it.
    pub message: String,
    pub data: Option<Value>,
    /// The original error, kept for logging; never serialized.
    pub cause: Option<anyhow::Error>,
}

impl MappedError {
    pub fn status(&self) -> StatusCode {
        self.entry.status
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn to_payload(&self, origin: Option<&str>) -> ErrorPayload {
        ErrorPayload {
            id: self.entry.id.clone(),
            message: self.message.clone(),
            data: self.data.clone(),
            origin: origin.map(str::to_string),
        }
    }
}

/// Resolves arbitrary errors to catalog entries.
///
/// Resolution order for one error:
///
/// 1. a [`Describe`] implementor in the chain that names a catalog id
/// 2. sentinel rules, in registration order
/// 3. type rules, in registration order
/// 4. the default entry
///
/// Rules may be registered while requests are being served; each resolution
/// reads one consistent snapshot of the rule lists.
pub struct ErrorMapper {
    catalog: Arc<ErrorCatalog>,
    default_entry: Arc<CatalogEntry>,
    describers: ArcSwap<Vec<Describer>>,
    sentinels: ArcSwap<Vec<Arc<Rule>>>,
    types: ArcSwap<Vec<Arc<Rule>>>,
}

impl ErrorMapper {
    /// A mapper with no rules beyond the built-in [`Problem`] and [`BindError`] descriptions.
    pub fn new(catalog: Arc<ErrorCatalog>, default_id: &str) -> Result<Self, CatalogError> {
        let default_entry = catalog.require(default_id)?;
        Ok(Self::with_default_entry(catalog, default_entry))
    }

    fn with_default_entry(catalog: Arc<ErrorCatalog>, default_entry: Arc<CatalogEntry>) -> Self {
        Self {
            catalog,
            default_entry,
            describers: ArcSwap::from_pointee(vec![
                describer::<Problem> as Describer,
                describer::<BindError> as Describer,
            ]),
            sentinels: ArcSwap::from_pointee(Vec::new()),
            types: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// The default catalog, `internal_error` as fallback, and type rules for
    /// the binder's own errors.
    pub fn standard() -> Self {
        let entries = standard_entries();
        let mut catalog = ErrorCatalog::new();
        for entry in &entries {
            catalog.insert(Arc::clone(entry));
        }
        let [internal, invalid, _, _, _, too_large, timeout] = entries;
        let mapper = Self::with_default_entry(Arc::new(catalog), internal);
        mapper.install_standard_rules(invalid, too_large, timeout);
        mapper
    }

    /// Like [`ErrorMapper::standard`] over a caller-built catalog.
    ///
    /// `catalog` must hold `internal_error`, `invalid_request`,
    /// `payload_too_large` and `request_timeout`; the first missing id is
    /// returned as [`CatalogError::Unknown`].
    pub fn standard_with(catalog: Arc<ErrorCatalog>) -> Result<Self, CatalogError> {
        let invalid = catalog.require(ids::INVALID_REQUEST)?;
        let too_large = catalog.require(ids::PAYLOAD_TOO_LARGE)?;
        let timeout = catalog.require(ids::REQUEST_TIMEOUT)?;
        let mapper = Self::new(catalog, ids::INTERNAL_ERROR)?;
        mapper.install_standard_rules(invalid, too_large, timeout);
        Ok(mapper)
    }

    fn install_standard_rules(
        &self,
        invalid: Arc<CatalogEntry>,
        too_large: Arc<CatalogEntry>,
        timeout: Arc<CatalogEntry>,
    ) {
        self.push_type_rule::<BindError, _>(Arc::clone(&invalid), |_| true);
        self.push_type_rule::<DecodeError, _>(invalid, |_| true);
        self.push_type_rule::<BodyError, _>(too_large, |e| {
            matches!(e, BodyError::TooLarge { .. })
        });
        self.push_type_rule::<BodyError, _>(timeout, |e| matches!(e, BodyError::Timeout(_)));
    }

    pub fn catalog(&self) -> &Arc<ErrorCatalog> {
        &self.catalog
    }

    pub fn default_entry(&self) -> &Arc<CatalogEntry> {
        &self.default_entry
    }

    /// Maps errors equal to `sentinel` (anywhere in the chain) to `id`.
    pub fn register_sentinel<E>(&self, sentinel: E, id: &str) -> Result<(), CatalogError>
    where
        E: StdError + PartialEq + Send + Sync + 'static,
    {
        let entry = self.catalog.require(id)?;
        let rule = Arc::new(Rule {
            matches: Box::new(move |err| any_in_chain::<E>(err, |e| *e == sentinel)),
            entry,
        });
        self.sentinels.rcu(|rules| {
            let mut next = Vec::clone(rules);
            next.push(Arc::clone(&rule));
            next
        });
        Ok(())
    }

    /// Maps any error of type `E` in the chain to `id`.
    pub fn register_type<E>(&self, id: &str) -> Result<(), CatalogError>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.register_type_where::<E, _>(id, |_| true)
    }

    /// Maps errors of type `E` that satisfy `predicate` to `id`.
    pub fn register_type_where<E, F>(&self, id: &str, predicate: F) -> Result<(), CatalogError>
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let entry = self.catalog.require(id)?;
        self.push_type_rule::<E, F>(entry, predicate);
        Ok(())
    }

    fn push_type_rule<E, F>(&self, entry: Arc<CatalogEntry>, predicate: F)
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let rule = Arc::new(Rule {
            matches: Box::new(move |err| any_in_chain::<E>(err, &predicate)),
            entry,
        });
        self.types.rcu(|rules| {
            let mut next = Vec::clone(rules);
            next.push(Arc::clone(&rule));
            next
        });
    }

    /// Lets errors of type `E` contribute catalog id, message and data through [`Describe`].
    pub fn describe<E>(&self)
    where
        E: Describe + StdError + Send + Sync + 'static,
    {
        let d = describer::<E> as Describer;
        self.describers.rcu(|describers| {
            let mut next = Vec::clone(describers);
            next.push(d);
            next
        });
    }

    /// Resolves `err`; `None` yields the default entry.
    pub fn resolve(&self, err: Option<anyhow::Error>) -> MappedError {
        match err {
            Some(err) => self.map(err),
            None => MappedError {
                message: self.default_entry.message.clone(),
                entry: Arc::clone(&self.default_entry),
                data: None,
                cause: None,
            },
        }
    }

    pub fn map(&self, err: anyhow::Error) -> MappedError {
        let describers = self.describers.load();
        let described: Vec<&dyn Describe> = describers.iter().filter_map(|d| d(&err)).collect();

        let entry = described
            .iter()
            .filter_map(|d| d.catalog_id())
            .find_map(|id| self.catalog.get(id))
            .or_else(|| self.match_rules(&self.sentinels.load(), &err))
            .or_else(|| self.match_rules(&self.types.load(), &err))
            .unwrap_or_else(|| Arc::clone(&self.default_entry));

        let message = described
            .iter()
            .filter_map(|d| d.public_message())
            .find(|m| !m.is_empty())
            .unwrap_or_else(|| entry.message.clone());
        let data = described.iter().find_map(|d| d.public_data());
        drop(described);

        MappedError {
            entry,
            message,
            data,
            cause: Some(err),
        }
    }

    fn match_rules(&self, rules: &[Arc<Rule>], err: &anyhow::Error) -> Option<Arc<CatalogEntry>> {
        rules
            .iter()
            .find(|rule| (rule.matches)(err))
            .map(|rule| Arc::clone(&rule.entry))
    }
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for ErrorMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMapper")
            .field("default", &self.default_entry.id)
            .field("sentinels", &self.sentinels.load().len())
            .field("types", &self.types.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{FieldError, Source};

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum StoreError {
        #[error("record missing")]
        Missing,
        #[error("store offline")]
        Offline,
    }

    fn mapper() -> ErrorMapper {
        let mut catalog = ErrorCatalog::with_defaults();
        catalog.register("pet_missing", 404, "no such pet").unwrap();
        catalog.register("store_down", 503, "").unwrap();
        ErrorMapper::new(Arc::new(catalog), ids::INTERNAL_ERROR).unwrap()
    }

    #[test]
    fn none_maps_to_default() {
        let mapped = ErrorMapper::standard().resolve(None);
        assert_eq!(mapped.id(), ids::INTERNAL_ERROR);
        assert_eq!(mapped.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unknown_error_keeps_its_text_private() {
        let mapped = ErrorMapper::standard().map(anyhow::anyhow!("db password is hunter2"));
        assert_eq!(mapped.id(), ids::INTERNAL_ERROR);
        assert!(!mapped.message.contains("hunter2"));
        assert!(mapped.data.is_none());
    }

    #[test]
    fn sentinel_matches_through_context() {
        let m = mapper();
        m.register_sentinel(StoreError::Missing, "pet_missing").unwrap();
        let err = anyhow::Error::from(StoreError::Missing).context("loading pet 7");
        assert_eq!(m.map(err).id(), "pet_missing");
        assert_eq!(m.map(StoreError::Offline.into()).id(), ids::INTERNAL_ERROR);
    }

    #[test]
    fn type_rule_applies_to_every_value() {
        let m = mapper();
        m.register_type::<StoreError>("store_down").unwrap();
        let mapped = m.map(StoreError::Offline.into());
        assert_eq!(mapped.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(mapped.message, "Service Unavailable");
    }

    #[test]
    fn sentinels_win_over_types() {
        let m = mapper();
        m.register_type::<StoreError>("store_down").unwrap();
        m.register_sentinel(StoreError::Missing, "pet_missing").unwrap();
        assert_eq!(m.map(StoreError::Missing.into()).id(), "pet_missing");
    }

    #[test]
    fn capability_beats_sentinel() {
        let m = mapper();
        m.register_sentinel(StoreError::Missing, "pet_missing").unwrap();
        let err = anyhow::Error::from(Problem::forbidden().with_cause(StoreError::Missing));
        assert_eq!(m.map(err).id(), ids::FORBIDDEN);
    }

    #[test]
    fn message_and_data_overrides_are_opt_in() {
        let m = mapper();
        let err = Problem::new("pet_missing")
            .with_message("no pet 7")
            .with_data(serde_json::json!({ "id": 7 }));
        let mapped = m.map(err.into());
        assert_eq!(mapped.message, "no pet 7");
        assert_eq!(mapped.data, Some(serde_json::json!({ "id": 7 })));
    }

    #[test]
    fn unknown_capability_id_falls_through() {
        let m = mapper();
        let mapped = m.map(Problem::new("no_such_entry").into());
        assert_eq!(mapped.id(), ids::INTERNAL_ERROR);
    }

    #[test]
    fn registering_unknown_id_fails() {
        let m = mapper();
        assert!(matches!(
            m.register_type::<StoreError>("nope"),
            Err(CatalogError::Unknown(_))
        ));
    }

    #[test]
    fn bind_errors_report_their_fields() {
        let err = BindError::new(vec![FieldError {
            field: "id".into(),
            source: Source::Path,
            message: "missing required value".into(),
        }]);
        let mapped = ErrorMapper::standard().map(err.into());
        assert_eq!(mapped.id(), ids::INVALID_REQUEST);
        let payload = mapped.to_payload(Some("req-1"));
        assert_eq!(payload.data.unwrap()["fields"][0]["source"], "path");
        assert_eq!(payload.origin.as_deref(), Some("req-1"));
    }

    #[test]
    fn standard_with_requires_the_entries_it_maps_to() {
        let mut catalog = ErrorCatalog::new();
        for id in [ids::INVALID_REQUEST, ids::PAYLOAD_TOO_LARGE, ids::REQUEST_TIMEOUT] {
            catalog.register(id, 400, "").unwrap();
        }
        assert_eq!(
            ErrorMapper::standard_with(Arc::new(catalog.clone())).unwrap_err(),
            CatalogError::Unknown(ids::INTERNAL_ERROR.to_string())
        );

        catalog.register(ids::INTERNAL_ERROR, 500, "").unwrap();
        let mapper = ErrorMapper::standard_with(Arc::new(catalog)).unwrap();
        assert_eq!(mapper.default_entry().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            mapper.map(BodyError::TooLarge { limit: 1 }.into()).id(),
            ids::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn standard_with_rejects_a_catalog_missing_a_rule_entry() {
        let mut catalog = ErrorCatalog::new();
        catalog.register(ids::INTERNAL_ERROR, 500, "").unwrap();
        assert!(matches!(
            ErrorMapper::standard_with(Arc::new(catalog)),
            Err(CatalogError::Unknown(id)) if id == ids::INVALID_REQUEST
        ));
    }

    #[test]
    fn body_errors_map_by_variant() {
        let m = ErrorMapper::standard();
        assert_eq!(
            m.map(BodyError::TooLarge { limit: 16 }.into()).id(),
            ids::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            m.map(BodyError::Timeout(std::time::Duration::from_secs(1)).into())
                .id(),
            ids::REQUEST_TIMEOUT
        );
    }
}
