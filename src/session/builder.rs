//! The report builder coordinator.

use std::sync::Arc;

use serde_json::Value;

use super::{BuilderServices, NoticeBoard};
use crate::catalog::{CatalogLoader, SchemaCatalog, SchemaField};
use crate::compose::{CompositionError, CompositionSurface, PillEdit, PillId, Slot};
use crate::config::QuerySettings;
use crate::drill::DrillStack;
use crate::error::{EngineResult, Notice, NoticeKind};
use crate::execute::{Completion, ExecutionGateway, PageLink, QueryResult, ResultView};
use crate::interactive::{Choice, DistinctValueService, FilterPanel};
use crate::join::{manual_join_choices, JoinValidation, JoinValidator, RunGate};
use crate::persist::PersistenceError;
use crate::query::{FieldRef, FilterSpec, FormatSpec, JoinType, Pagination, QueryDefinition};
use crate::reports::{PermissionTier, Report, ReportLibrary, ShareGrant};

const RESULT_TARGET: &str = "report-builder";

/// State container of one report builder.
///
/// Every mutation of the surface ends in a full resync of the canonical
/// definition followed by join revalidation. Runs are refused while the last
/// validation did not pass.
pub struct ReportBuilder {
    user_id: String,
    loader: CatalogLoader,
    validator: JoinValidator,
    gateway: ExecutionGateway,
    distinct: Arc<dyn DistinctValueService>,
    library: Arc<ReportLibrary>,
    settings: QuerySettings,

    connection_id: Option<String>,
    catalog: Option<SchemaCatalog>,
    surface: CompositionSurface,
    definition: QueryDefinition,
    gate: RunGate,
    drill: DrillStack,
    panel: FilterPanel,
    page: u32,
    current_report: Option<String>,
    notices: NoticeBoard,
}

impl ReportBuilder {
    pub fn new(user_id: impl Into<String>, services: BuilderServices, settings: QuerySettings) -> Self {
        let gateway = ExecutionGateway::new(services.executor, RESULT_TARGET)
            .with_page_window(settings.page_window);
        Self {
            user_id: user_id.into(),
            loader: CatalogLoader::new(services.schema),
            validator: JoinValidator::new(services.index),
            gateway,
            distinct: services.distinct,
            library: services.library,
            settings,
            connection_id: None,
            catalog: None,
            surface: CompositionSurface::new(),
            definition: QueryDefinition::default(),
            gate: RunGate::default(),
            drill: DrillStack::new(),
            panel: FilterPanel::new(),
            page: 1,
            current_report: None,
            notices: NoticeBoard::default(),
        }
    }

    /// Use a preconfigured loader, e.g. one with a catalog cache.
    pub fn with_loader(mut self, loader: CatalogLoader) -> Self {
        self.loader = loader;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn catalog(&self) -> Option<&SchemaCatalog> {
        self.catalog.as_ref()
    }

    pub fn surface(&self) -> &CompositionSurface {
        &self.surface
    }

    /// The canonical definition, as of the last resync.
    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    pub fn validation(&self) -> Option<&JoinValidation> {
        self.gate.last()
    }

    pub fn can_run(&self) -> bool {
        self.gate.can_run()
    }

    pub fn view(&self) -> &ResultView {
        self.gateway.view()
    }

    pub fn result(&self) -> Option<&QueryResult> {
        self.gateway.result()
    }

    /// Result rows with the read-time formats applied.
    pub fn formatted_rows(&self) -> Vec<Vec<String>> {
        self.gateway.view().formatted_rows(&self.definition.formats)
    }

    pub fn page_links(&self) -> Vec<PageLink> {
        self.gateway.page_links()
    }

    pub fn drill(&self) -> &DrillStack {
        &self.drill
    }

    pub fn filter_panel(&self) -> &FilterPanel {
        &self.panel
    }

    pub fn current_report(&self) -> Option<&str> {
        self.current_report.as_deref()
    }

    pub fn notices(&self) -> &[Notice] {
        self.notices.all()
    }

    /// Remove and return the transient notices.
    pub fn take_transient_notices(&mut self) -> Vec<Notice> {
        self.notices.take_transient()
    }

    // ------------------------------------------------------------------
    // Connection and composition
    // ------------------------------------------------------------------

    /// Switch to a connection and load its catalog.
    ///
    /// All composition, result, drill and filter state is reset. A load
    /// failure leaves the builder without a catalog and shows an inline
    /// notice next to the selector.
    pub async fn select_connection(&mut self, connection_id: &str) -> EngineResult<()> {
        tracing::info!(connection = connection_id, "connection selected");
        self.notices.clear(NoticeKind::Inline);
        self.reset_state();
        self.connection_id = Some(connection_id.to_string());

        match self.loader.load(connection_id).await {
            Ok(catalog) => {
                self.catalog = Some(catalog);
                self.after_edit().await;
                Ok(())
            }
            Err(e) => {
                self.catalog = None;
                Err(self.notices.report("select_connection", e.into()))
            }
        }
    }

    /// Reload the catalog of the current connection, bypassing the cache.
    pub async fn refresh_catalog(&mut self) -> EngineResult<()> {
        let Some(connection_id) = self.connection_id.clone() else {
            return Ok(());
        };
        self.notices.clear(NoticeKind::Inline);
        match self.loader.refresh(&connection_id).await {
            Ok(catalog) => {
                self.catalog = Some(catalog);
                Ok(())
            }
            Err(e) => Err(self.notices.report("refresh_catalog", e.into())),
        }
    }

    fn reset_state(&mut self) {
        self.surface.clear();
        self.definition = QueryDefinition::default();
        self.gate.reset();
        self.drill.clear();
        self.panel.reset();
        self.panel.hide();
        self.gateway.clear();
        self.page = 1;
        self.current_report = None;
        self.notices.clear(NoticeKind::Blocking);
        self.notices.clear(NoticeKind::ResultArea);
    }

    /// Drop a catalog or calculated field into a slot.
    pub async fn add_field(&mut self, slot: Slot, field: &FieldRef) -> EngineResult<PillId> {
        let placed = if field.is_calculated() {
            self.surface.drop_calculated(slot, &field.name)
        } else {
            match self.catalog_field(field) {
                Some(schema_field) => self.surface.drop_field(slot, &schema_field),
                None => Err(CompositionError::UnknownField(field.clone())),
            }
        };
        let id = placed.map_err(|e| self.notices.report("add_field", e.into()))?;
        self.after_edit().await;
        Ok(id)
    }

    /// Define a calculated field from a formula.
    pub async fn add_calculated_field(&mut self, name: &str, formula: &str) -> EngineResult<PillId> {
        let id = self
            .surface
            .add_calculated(name, formula)
            .map_err(|e| self.notices.report("add_calculated_field", e.into()))?;
        self.after_edit().await;
        Ok(id)
    }

    pub async fn remove_field(&mut self, id: PillId) -> EngineResult<()> {
        self.surface
            .remove(id)
            .map_err(|e| self.notices.report("remove_field", e.into()))?;
        self.after_edit().await;
        Ok(())
    }

    pub async fn edit_pill(&mut self, id: PillId, edit: PillEdit) -> EngineResult<()> {
        self.surface
            .edit(id, edit)
            .map_err(|e| self.notices.report("edit_pill", e.into()))?;
        self.after_edit().await;
        Ok(())
    }

    /// Add a join pill. Either side may be left open and filled in later.
    pub async fn add_join(
        &mut self,
        left: Option<FieldRef>,
        join_type: JoinType,
        right: Option<FieldRef>,
    ) -> EngineResult<PillId> {
        let id = self
            .surface
            .add_join(left, join_type, right)
            .map_err(|e| self.notices.report("add_join", e.into()))?;
        self.after_edit().await;
        Ok(id)
    }

    /// Add the joins suggested by the last blocked validation.
    /// Returns the number of joins added.
    pub async fn apply_suggested_joins(&mut self) -> EngineResult<usize> {
        let suggestions = self
            .gate
            .last()
            .map(|v| v.suggestions().to_vec())
            .unwrap_or_default();
        let mut added = 0;
        for join in suggestions {
            if self.definition.joins.contains(&join) {
                continue;
            }
            self.surface.add_suggested_join(join);
            added += 1;
        }
        tracing::debug!(added, "suggested joins applied");
        self.after_edit().await;
        Ok(added)
    }

    /// Fields offered for building a join by hand.
    pub fn manual_join_choices(&self) -> Vec<&SchemaField> {
        match &self.catalog {
            Some(catalog) => manual_join_choices(&self.definition, catalog),
            None => Vec::new(),
        }
    }

    /// Set or clear the read-time format of a result header.
    pub fn set_format(&mut self, header: impl Into<String>, format: Option<FormatSpec>) {
        self.surface.set_format(header, format);
        self.resync();
    }

    fn catalog_field(&self, field: &FieldRef) -> Option<SchemaField> {
        self.catalog.as_ref()?.field(field).cloned()
    }

    fn resync(&mut self) {
        self.definition = self.surface.resync(
            self.connection_id.as_deref(),
            Pagination::new(self.page, self.settings.default_page_size),
        );
    }

    /// Resync the definition and revalidate its joins into the run gate.
    async fn after_edit(&mut self) {
        self.resync();
        let validation = self.validator.validate(&self.definition).await;
        match validation.error() {
            None => {
                self.notices.clear(NoticeKind::Blocking);
                tracing::debug!(tables = ?self.definition.referenced_tables(), "joins valid");
            }
            Some(e) => {
                tracing::info!(error = %e, "run blocked by join validation");
                self.notices.push(Notice::new(NoticeKind::Blocking, e.to_string()));
            }
        }
        self.gate.record(validation);
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run the definition, with the interactive filters applied, for `page`.
    pub async fn run(&mut self, page: u32) -> EngineResult<Completion> {
        if let Err(e) = self.gate.check() {
            return Err(self.notices.report("run", e.into()));
        }
        self.page = page.max(1);
        self.resync();
        self.prune_interactive_filters();
        let composed = self
            .definition
            .with_extra_filters(&self.panel.filter_specs())
            .with_page(self.page);

        match self.gateway.submit(&composed).await {
            Ok(completion) => {
                if completion == Completion::Applied {
                    self.notices.clear(NoticeKind::ResultArea);
                }
                Ok(completion)
            }
            Err(e) => Err(self.notices.report("run", e.into())),
        }
    }

    /// Narrow the result to one value of a grouped column and re-run.
    pub async fn drill_down(&mut self, header: &str, value: Value) -> EngineResult<Completion> {
        let filters = self
            .drill
            .drill_down(&self.definition, header, value)
            .map_err(|e| self.notices.report("drill_down", e.into()))?;
        self.replace_filters(&filters).await;
        self.run(1).await
    }

    /// Restore the filters captured by the last drill-down and re-run.
    pub async fn drill_back(&mut self) -> EngineResult<Completion> {
        let filters = self
            .drill
            .drill_back(&self.definition.filters)
            .map_err(|e| self.notices.report("drill_back", e.into()))?;
        self.replace_filters(&filters).await;
        self.run(1).await
    }

    async fn replace_filters(&mut self, filters: &[FilterSpec]) {
        if let Some(catalog) = &self.catalog {
            self.surface.replace_filters(filters, catalog);
        }
        self.after_edit().await;
    }

    // ------------------------------------------------------------------
    // Interactive filters
    // ------------------------------------------------------------------

    /// Show the filter panel, offering the non-numeric result columns.
    pub async fn show_filter_panel(&mut self) -> EngineResult<()> {
        self.prune_interactive_filters();
        let (Some(connection_id), Some(catalog)) = (self.connection_id.as_deref(), &self.catalog) else {
            self.panel.show();
            return Ok(());
        };
        let fields = self
            .gateway
            .result()
            .map(|r| FilterPanel::eligible_fields(r, catalog))
            .unwrap_or_default();
        if let Err(e) = self.panel.load(self.distinct.as_ref(), connection_id, fields).await {
            return Err(self.notices.report("show_filter_panel", e.into()));
        }
        self.panel.show();
        Ok(())
    }

    /// Forget interactive filters on fields the definition no longer shows.
    fn prune_interactive_filters(&mut self) {
        let Some(catalog) = &self.catalog else {
            return;
        };
        let keep = FilterPanel::eligible_headers(&self.definition.headers(), catalog);
        let dropped = self.panel.retain_fields(&keep);
        if dropped > 0 {
            tracing::debug!(dropped, "interactive filters dropped with their columns");
        }
    }

    /// Hide the panel. Applied filters stay in effect.
    pub fn hide_filter_panel(&mut self) {
        self.panel.hide();
    }

    /// Change a selector. Returns false if the field has no selector.
    pub fn select_filter(&mut self, field: &FieldRef, choice: Choice) -> bool {
        self.panel.select(field, choice)
    }

    /// Apply the selectors and re-run from the first page.
    pub async fn apply_interactive_filters(&mut self) -> EngineResult<Completion> {
        let applied = self.panel.apply().len();
        tracing::debug!(filters = applied, "interactive filters applied");
        self.run(1).await
    }

    // ------------------------------------------------------------------
    // Report library
    // ------------------------------------------------------------------

    /// Save the current definition as a new report and make it current.
    pub async fn save_as(&mut self, name: &str, description: &str) -> EngineResult<Report> {
        let definition = self.stored_definition();
        match self.library.save_as(&self.user_id, name, description, &definition).await {
            Ok(report) => {
                self.current_report = Some(report.id.clone());
                Ok(report)
            }
            Err(e) => Err(self.notices.report("save_as", e.into())),
        }
    }

    /// Overwrite the current report with the current definition.
    pub async fn update(&mut self) -> EngineResult<Report> {
        let Some(report_id) = self.current_report.clone() else {
            return Err(self.notices.report("update", PersistenceError::NoCurrentReport.into()));
        };
        let definition = self.stored_definition();
        self.library
            .update(&self.user_id, &report_id, &definition)
            .await
            .map_err(|e| self.notices.report("update", e.into()))
    }

    /// Open a saved report, switching connection if needed.
    pub async fn open_report(&mut self, report_id: &str) -> EngineResult<Report> {
        let report = self
            .library
            .open(&self.user_id, report_id)
            .await
            .map_err(|e| self.notices.report("open_report", e.into()))?;

        let connection_id = report.definition.connection_id.clone();
        match connection_id {
            Some(id) if self.connection_id.as_deref() != Some(id.as_str()) || self.catalog.is_none() => {
                self.select_connection(&id).await?;
            }
            _ => self.reset_state(),
        }

        if let Some(catalog) = &self.catalog {
            self.surface.load_definition(&report.definition, catalog);
        }
        self.current_report = Some(report.id.clone());
        self.after_edit().await;
        tracing::info!(report = %report.id, tier = %report.permission_tier, "report opened");
        Ok(report)
    }

    pub async fn share(
        &mut self,
        report_id: &str,
        grantee_id: &str,
        tier: PermissionTier,
    ) -> EngineResult<ShareGrant> {
        self.library
            .share(&self.user_id, report_id, grantee_id, tier)
            .await
            .map_err(|e| self.notices.report("share", e.into()))
    }

    pub async fn list_reports(&mut self) -> EngineResult<Vec<Report>> {
        self.library
            .list(&self.user_id)
            .await
            .map_err(|e| self.notices.report("list_reports", e.into()))
    }

    pub async fn delete_report(&mut self, report_id: &str) -> EngineResult<()> {
        self.library
            .delete(&self.user_id, report_id)
            .await
            .map_err(|e| self.notices.report("delete_report", e.into()))?;
        if self.current_report.as_deref() == Some(report_id) {
            self.current_report = None;
        }
        Ok(())
    }

    /// The definition as stored: builder state only, first page.
    fn stored_definition(&self) -> QueryDefinition {
        let mut definition = self.definition.clone();
        definition.pagination = Pagination::new(1, self.settings.default_page_size);
        definition
    }
}

