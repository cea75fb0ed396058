//! Cross-session, transient UI state
//!
//! Derived fields are recomputed inside the mutation that changes their
//! inputs:
//!
//! - `turbo_mode` follows `selected_models.len() > 1` whenever a change to
//!   the selection crosses that threshold
//! - `turbo_mode_expanded` is forced off whenever `turbo_mode` is off
//! - `turbo_sessions` only keeps keys present in `selected_models`

use std::collections::BTreeMap;

use serde::Serialize;

use crate::session::FileDescriptor;

/// Aggregate flags derived from [`UiState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiSummary {
    /// Whether a screenshot is attached
    pub has_screenshot: bool,
    /// Whether files are attached to the next submission
    pub has_files: bool,
    /// Whether reference text is selected
    pub has_selection: bool,
    /// Whether any modal is visible
    pub is_any_modal_open: bool,
    /// Turbo mode on
    pub turbo_mode: bool,
    /// Number of selected models
    pub selected_model_count: usize,
    /// Global loading flag
    pub loading: bool,
}

/// Ephemeral UI state shared by every session
#[derive(Debug, Clone, Default)]
pub struct UiState {
    input_value: String,
    loading: bool,
    reference_modal_visible: bool,
    model_selection_modal_visible: bool,
    settings_modal_visible: bool,
    current_selection: Option<String>,
    selected_models: Vec<String>,
    is_expanded: bool,
    turbo_mode: bool,
    turbo_mode_expanded: bool,
    turbo_sessions: BTreeMap<String, String>,
    is_screenshot_mode: bool,
    screenshot_data: Option<String>,
    current_session_files: Vec<FileDescriptor>,
    attachments_open: bool,
}

impl UiState {
    /// Create the initial state
    pub fn new() -> Self {
        Self::default()
    }

    // Input and loading

    /// Text currently in the input box
    pub fn input_value(&self) -> &str {
        &self.input_value
    }

    /// Replace the input text
    pub fn set_input_value(&mut self, value: impl Into<String>) {
        self.input_value = value.into();
    }

    /// Empty the input box
    pub fn clear_input(&mut self) {
        self.input_value.clear();
    }

    /// True while any submission is in flight
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Set the global loading flag
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    // Modals

    /// Whether the reference modal is shown
    pub fn reference_modal_visible(&self) -> bool {
        self.reference_modal_visible
    }

    /// Show or hide the reference modal
    pub fn set_reference_modal_visible(&mut self, visible: bool) {
        self.reference_modal_visible = visible;
    }

    /// Whether the model selection modal is shown
    pub fn model_selection_modal_visible(&self) -> bool {
        self.model_selection_modal_visible
    }

    /// Show or hide the model selection modal
    pub fn set_model_selection_modal_visible(&mut self, visible: bool) {
        self.model_selection_modal_visible = visible;
    }

    /// Whether the settings modal is shown
    pub fn settings_modal_visible(&self) -> bool {
        self.settings_modal_visible
    }

    /// Show or hide the settings modal
    pub fn set_settings_modal_visible(&mut self, visible: bool) {
        self.settings_modal_visible = visible;
    }

    // Selection and layout

    /// Text selection captured from the host page
    pub fn current_selection(&self) -> Option<&str> {
        self.current_selection.as_deref()
    }

    /// Replace the captured selection
    pub fn set_current_selection(&mut self, selection: Option<String>) {
        self.current_selection = selection;
    }

    /// Whether the sidebar is expanded
    pub fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    /// Expand or collapse the sidebar
    pub fn set_expanded(&mut self, expanded: bool) {
        self.is_expanded = expanded;
    }

    /// Flip the sidebar expansion
    pub fn toggle_expanded(&mut self) {
        self.is_expanded = !self.is_expanded;
    }

    // Model selection and turbo mode

    /// Selected models in selection order
    pub fn selected_models(&self) -> &[String] {
        &self.selected_models
    }

    /// Replace the selection, dropping duplicates
    pub fn set_selected_models(&mut self, models: Vec<String>) {
        let previous = self.selected_models.len();
        self.selected_models.clear();
        for model in models {
            if !self.selected_models.contains(&model) {
                self.selected_models.push(model);
            }
        }
        self.after_selection_change(previous);
    }

    /// Add a model; returns false if it was already selected
    pub fn add_selected_model(&mut self, model: &str) -> bool {
        if self.selected_models.iter().any(|m| m == model) {
            return false;
        }
        let previous = self.selected_models.len();
        self.selected_models.push(model.to_string());
        self.after_selection_change(previous);
        true
    }

    /// Remove a model; returns false if it was not selected
    pub fn remove_selected_model(&mut self, model: &str) -> bool {
        let previous = self.selected_models.len();
        self.selected_models.retain(|m| m != model);
        if self.selected_models.len() == previous {
            return false;
        }
        self.after_selection_change(previous);
        true
    }

    /// Deselect every model
    pub fn clear_selected_models(&mut self) {
        let previous = self.selected_models.len();
        self.selected_models.clear();
        self.after_selection_change(previous);
    }

    /// Whether submissions fan out to the selected models
    pub fn turbo_mode(&self) -> bool {
        self.turbo_mode
    }

    /// Set turbo mode explicitly; turning it off collapses the expansion
    pub fn set_turbo_mode(&mut self, enabled: bool) {
        self.turbo_mode = enabled;
        self.enforce_expansion();
    }

    /// Whether the turbo comparison view is expanded
    pub fn turbo_mode_expanded(&self) -> bool {
        self.turbo_mode_expanded
    }

    /// Expand or collapse the comparison layout; stays off without turbo
    pub fn set_turbo_mode_expanded(&mut self, expanded: bool) {
        self.turbo_mode_expanded = expanded;
        self.enforce_expansion();
    }

    /// Model to session id map of the last turbo submission
    pub fn turbo_sessions(&self) -> &BTreeMap<String, String> {
        &self.turbo_sessions
    }

    /// Replace the turbo-session map; unselected models are dropped
    pub fn set_turbo_sessions(&mut self, sessions: BTreeMap<String, String>) {
        self.turbo_sessions = sessions;
        self.prune_turbo_sessions();
    }

    /// Session id created for `model` by the last turbo submission
    pub fn turbo_session_for(&self, model: &str) -> Option<&str> {
        self.turbo_sessions.get(model).map(String::as_str)
    }

    /// Leave turbo mode entirely
    pub fn cancel_turbo_mode(&mut self) {
        self.turbo_mode = false;
        self.turbo_mode_expanded = false;
        self.selected_models.clear();
        self.turbo_sessions.clear();
    }

    // Screenshot and attachments

    /// Whether screenshot capture mode is on
    pub fn is_screenshot_mode(&self) -> bool {
        self.is_screenshot_mode
    }

    /// Turn screenshot capture mode on or off
    pub fn set_screenshot_mode(&mut self, enabled: bool) {
        self.is_screenshot_mode = enabled;
    }

    /// Captured screenshot, if any
    pub fn screenshot_data(&self) -> Option<&str> {
        self.screenshot_data.as_deref()
    }

    /// Replace the captured screenshot
    pub fn set_screenshot_data(&mut self, data: Option<String>) {
        self.screenshot_data = data;
    }

    /// Drop the captured screenshot
    pub fn clear_screenshot_data(&mut self) {
        self.screenshot_data = None;
        self.is_screenshot_mode = false;
    }

    /// Files attached to the current session's next message
    pub fn current_session_files(&self) -> &[FileDescriptor] {
        &self.current_session_files
    }

    /// Mirror the current session's attached files
    pub fn set_current_session_files(&mut self, files: Vec<FileDescriptor>) {
        self.current_session_files = files;
    }

    /// Whether the attachments panel is open
    pub fn attachments_open(&self) -> bool {
        self.attachments_open
    }

    /// Open or close the attachments panel
    pub fn set_attachments_open(&mut self, open: bool) {
        self.attachments_open = open;
    }

    /// Clear session-scoped fields, keeping layout and turbo preference
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_sidebar::ui_state::UiState;
    ///
    /// let mut ui = UiState::new();
    /// ui.set_expanded(true);
    /// ui.set_turbo_mode(true);
    /// ui.set_input_value("draft");
    /// ui.reset_ui_state();
    /// assert!(ui.is_expanded());
    /// assert!(ui.turbo_mode());
    /// assert_eq!(ui.input_value(), "");
    /// ```
    pub fn reset_ui_state(&mut self) {
        self.input_value.clear();
        self.loading = false;
        self.reference_modal_visible = false;
        self.model_selection_modal_visible = false;
        self.settings_modal_visible = false;
        self.current_selection = None;
        self.selected_models.clear();
        self.is_screenshot_mode = false;
        self.screenshot_data = None;
        self.current_session_files.clear();
        self.attachments_open = false;
        self.turbo_mode_expanded = false;
        self.turbo_sessions.clear();
    }

    /// Aggregate flags for renderers
    pub fn summary(&self) -> UiSummary {
        UiSummary {
            has_screenshot: self.screenshot_data.is_some(),
            has_files: !self.current_session_files.is_empty(),
            has_selection: self
                .current_selection
                .as_deref()
                .map(|s| !s.is_empty())
                .unwrap_or(false),
            is_any_modal_open: self.reference_modal_visible
                || self.model_selection_modal_visible
                || self.settings_modal_visible,
            turbo_mode: self.turbo_mode,
            selected_model_count: self.selected_models.len(),
            loading: self.loading,
        }
    }

    fn after_selection_change(&mut self, previous_len: usize) {
        let was_multi = previous_len > 1;
        let is_multi = self.selected_models.len() > 1;
        if was_multi != is_multi {
            self.turbo_mode = is_multi;
        }
        self.enforce_expansion();
        self.prune_turbo_sessions();
    }

    fn enforce_expansion(&mut self) {
        if !self.turbo_mode {
            self.turbo_mode_expanded = false;
        }
    }

    fn prune_turbo_sessions(&mut self) {
        let selected = &self.selected_models;
        self.turbo_sessions.retain(|model, _| selected.contains(model));
    }
}
