use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

mod dom;
pub mod fetch;
mod form;
mod html;
mod interceptor;
mod selector;

use dom::Dom;
pub use dom::NodeId;
pub use fetch::{Fetch, FetchError, FetchRequest, FetchResponse, HttpFetch, ScriptedFetch};
pub use form::url_encode_form;
use interceptor::Binding;
pub use interceptor::{
    BindingId, GIFT_CARD_ACTION_ATTR, GIFT_CARD_BLOCK_SELECTOR, GIFT_CARD_REBIND_SELECTOR,
    GIFT_CARD_REDIRECT_ATTR, InterceptorConfig,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    UnsupportedSelector(String),
    SelectorNotFound(String),
    MissingDataAttribute {
        selector: String,
        attribute: String,
    },
    TypeMismatch {
        selector: String,
        expected: String,
        actual: String,
    },
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
    Dom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::MissingDataAttribute {
                selector,
                attribute,
            } => write!(f, "element {selector} has no {attribute} attribute"),
            Self::TypeMismatch {
                selector,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for {selector}: expected {expected}, actual {actual}"
            ),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
            Self::Dom(msg) => write!(f, "dom error: {msg}"),
        }
    }
}

impl StdError for Error {}

#[derive(Debug, Clone)]
struct EventState {
    event_type: String,
    target: NodeId,
    current_target: NodeId,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl EventState {
    fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: target,
            default_prevented: false,
            propagation_stopped: false,
        }
    }
}

/// An in-flight submission awaiting [`Harness::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub binding: BindingId,
    pub url: String,
    pub body: String,
}

#[derive(Debug, Clone)]
struct QueuedFetch {
    binding: BindingId,
    request: FetchRequest,
    redirect: String,
    config: InterceptorConfig,
}

/// A deterministic page instance: DOM, interceptor bindings, pending
/// submissions, navigation state, and a diagnostic log.
///
/// The interceptor contract is the gift card block's: a submit on a bound
/// element never navigates by default; instead the form fields are snapshotted
/// and POSTed through the transport. A redirected response navigates to the
/// bound redirect URL; a fragment response replaces the block and re-arms the
/// interceptor on the fresh markup. Submissions stay queued until `flush`, so
/// tests control exactly when the asynchronous continuation runs.
pub struct Harness {
    dom: Dom,
    bindings: Vec<Binding>,
    next_binding_id: i64,
    fetch_queue: Vec<QueuedFetch>,
    transport: Box<dyn Fetch>,
    location: Option<String>,
    trace: bool,
    diagnostics: Vec<String>,
    diagnostics_limit: usize,
    diagnostics_to_stderr: bool,
}

impl Harness {
    pub fn from_html(html: &str) -> Result<Self> {
        Self::from_html_with(html, Box::new(ScriptedFetch::new()))
    }

    pub fn from_html_with(html: &str, transport: Box<dyn Fetch>) -> Result<Self> {
        Ok(Self {
            dom: html::parse_html(html)?,
            bindings: Vec::new(),
            next_binding_id: 1,
            fetch_queue: Vec::new(),
            transport,
            location: None,
            trace: false,
            diagnostics: Vec::new(),
            diagnostics_limit: 10_000,
            diagnostics_to_stderr: false,
        })
    }

    pub fn set_transport(&mut self, transport: Box<dyn Fetch>) {
        self.transport = transport;
    }

    /// Installs the gift card interceptor on the element matching `selector`.
    pub fn bind_add_to_order(&mut self, selector: &str) -> Result<BindingId> {
        self.bind_with_config(selector, InterceptorConfig::gift_card())
    }

    pub fn bind_with_config(
        &mut self,
        selector: &str,
        config: InterceptorConfig,
    ) -> Result<BindingId> {
        let node = self.select_one(selector)?;
        let action = self.dom.attr(node, &config.action_attr).ok_or_else(|| {
            Error::MissingDataAttribute {
                selector: selector.to_string(),
                attribute: config.action_attr.clone(),
            }
        })?;
        let redirect = self.dom.attr(node, &config.redirect_attr).ok_or_else(|| {
            Error::MissingDataAttribute {
                selector: selector.to_string(),
                attribute: config.redirect_attr.clone(),
            }
        })?;
        Ok(self.install_binding(node, action, redirect, config))
    }

    fn install_binding(
        &mut self,
        node: NodeId,
        action: String,
        redirect: String,
        config: InterceptorConfig,
    ) -> BindingId {
        let id = BindingId(self.next_binding_id);
        self.next_binding_id += 1;
        self.trace(format!(
            "bind {} on {} (action {action}, redirect {redirect})",
            id.0,
            self.event_node_label(node)
        ));
        self.bindings.push(Binding {
            id,
            node,
            action,
            redirect,
            config,
        });
        id
    }

    /// Removes a binding. The disposer counterpart of `bind_add_to_order`.
    pub fn unbind(&mut self, binding: BindingId) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|entry| entry.id != binding);
        self.bindings.len() != before
    }

    pub fn active_bindings(&self) -> usize {
        self.bindings.len()
    }

    pub fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let tag = self
            .dom
            .tag_name(target)
            .unwrap_or_default()
            .to_ascii_lowercase();
        if tag != "input" && tag != "textarea" {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input|textarea".into(),
                actual: tag,
            });
        }
        self.dom.set_value(target, text)?;
        self.dispatch_event(target, "input")?;
        Ok(())
    }

    pub fn set_checked(&mut self, selector: &str, checked: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let tag = self
            .dom
            .tag_name(target)
            .unwrap_or_default()
            .to_ascii_lowercase();
        if tag != "input" {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input[type=checkbox|radio]".into(),
                actual: tag,
            });
        }
        let kind = self
            .dom
            .attr(target, "type")
            .unwrap_or_else(|| "text".into())
            .to_ascii_lowercase();
        if kind != "checkbox" && kind != "radio" {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input[type=checkbox|radio]".into(),
                actual: format!("input[type={kind}]"),
            });
        }

        if self.dom.checked(target) != checked {
            if kind == "radio" && checked {
                self.uncheck_other_radios_in_group(target)?;
            }
            self.dom.set_checked(target, checked)?;
            self.dispatch_event(target, "input")?;
            self.dispatch_event(target, "change")?;
        }
        Ok(())
    }

    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if self.dom.disabled(target) {
            return Ok(());
        }

        let click_outcome = self.dispatch_event(target, "click")?;
        if click_outcome.default_prevented {
            return Ok(());
        }

        if form::is_checkbox_input(&self.dom, target) {
            let current = self.dom.checked(target);
            self.dom.set_checked(target, !current)?;
            self.dispatch_event(target, "input")?;
            self.dispatch_event(target, "change")?;
        }

        if form::is_radio_input(&self.dom, target) && !self.dom.checked(target) {
            self.uncheck_other_radios_in_group(target)?;
            self.dom.set_checked(target, true)?;
            self.dispatch_event(target, "input")?;
            self.dispatch_event(target, "change")?;
        }

        if form::is_submit_control(&self.dom, target) {
            if let Some(form_id) = self.resolve_form_for_submit(target) {
                self.dispatch_event(form_id, "submit")?;
            }
        }

        Ok(())
    }

    pub fn submit(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if let Some(form_id) = self.resolve_form_for_submit(target) {
            self.dispatch_event(form_id, "submit")?;
        }
        Ok(())
    }

    pub fn dispatch(&mut self, selector: &str, event: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dispatch_event(target, event)?;
        Ok(())
    }

    /// Resolves queued submissions in FIFO order. Exactly one outcome per
    /// entry: navigation, block replacement plus rebind, or a logged failure.
    pub fn flush(&mut self) -> Result<()> {
        let queue = std::mem::take(&mut self.fetch_queue);
        for queued in queue {
            match self.transport.post(&queued.request) {
                Err(err) => {
                    self.diagnostic(format!("fetch POST {} failed: {err}", queued.request.url));
                }
                Ok(response) if response.redirected => {
                    self.trace(format!("navigating to {}", queued.redirect));
                    self.location = Some(queued.redirect);
                }
                Ok(response) => {
                    self.apply_fragment(&queued, &response.body)?;
                }
            }
        }
        Ok(())
    }

    fn apply_fragment(&mut self, queued: &QueuedFetch, body: &str) -> Result<()> {
        let Some(block) = self.dom.query_selector(&queued.config.block_selector)? else {
            self.diagnostic(format!(
                "block selector {:?} matched nothing; fragment dropped",
                queued.config.block_selector
            ));
            return Ok(());
        };

        let fragment = match html::parse_html(body) {
            Ok(fragment) => fragment,
            Err(err) => {
                self.diagnostic(format!(
                    "fragment for POST {} did not parse: {err}",
                    queued.request.url
                ));
                return Ok(());
            }
        };

        self.dom.replace_with_fragment(block, &fragment)?;
        let detached = self
            .bindings
            .iter()
            .filter(|binding| !self.dom.is_connected(binding.node))
            .count();
        if detached > 0 {
            self.trace(format!("{detached} binding(s) detached by replacement"));
        }
        let dom = &self.dom;
        self.bindings.retain(|binding| dom.is_connected(binding.node));

        let Some(target) = self.dom.query_selector(&queued.config.rebind_selector)? else {
            self.diagnostic(format!(
                "rebind selector {:?} matched nothing after replacement",
                queued.config.rebind_selector
            ));
            return Ok(());
        };

        let config = queued.config.clone();
        let Some(action) = self.dom.attr(target, &config.action_attr) else {
            self.diagnostic(format!(
                "rebind target lacks {}; interceptor not re-armed",
                config.action_attr
            ));
            return Ok(());
        };
        let Some(redirect) = self.dom.attr(target, &config.redirect_attr) else {
            self.diagnostic(format!(
                "rebind target lacks {}; interceptor not re-armed",
                config.redirect_attr
            ));
            return Ok(());
        };

        self.install_binding(target, action, redirect, config);
        Ok(())
    }

    pub fn pending_fetches(&self) -> Vec<PendingFetch> {
        self.fetch_queue
            .iter()
            .map(|queued| PendingFetch {
                binding: queued.binding,
                url: queued.request.url.clone(),
                body: queued.request.body.clone(),
            })
            .collect()
    }

    /// The browsing context location, set only by a redirected submission.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    fn dispatch_event(&mut self, target: NodeId, event_type: &str) -> Result<EventState> {
        let mut event = EventState::new(event_type, target);

        let mut path = vec![target];
        let mut current = self.dom.parent_element(target);
        while let Some(node) = current {
            path.push(node);
            current = self.dom.parent_element(node);
        }

        let label = self.event_node_label(target);
        self.trace(format!("event {event_type} on {label}"));

        // Target phase, then bubbling.
        for node in path {
            event.current_target = node;
            let bindings: Vec<Binding> = self
                .bindings
                .iter()
                .filter(|binding| binding.node == node)
                .cloned()
                .collect();
            for binding in bindings {
                if event.event_type == "submit" {
                    self.run_interceptor(&binding, &mut event);
                }
            }
            if event.propagation_stopped {
                break;
            }
        }

        if event.event_type == "submit" && !event.default_prevented {
            // Default form navigation is not modeled by this runtime.
            let label = self.event_node_label(target);
            self.trace(format!(
                "submit on {label} had no interceptor; default navigation skipped"
            ));
        }

        Ok(event)
    }

    fn run_interceptor(&mut self, binding: &Binding, event: &mut EventState) {
        event.default_prevented = true;

        let entries = form::form_data_entries(&self.dom, event.current_target);
        let body = url_encode_form(&entries);
        let origin = self.event_node_label(event.target);
        self.trace(format!(
            "binding {} intercepts submit from {origin}; queues POST {} ({} field(s))",
            binding.id.0,
            binding.action,
            entries.len()
        ));
        self.fetch_queue.push(QueuedFetch {
            binding: binding.id,
            request: FetchRequest {
                url: binding.action.clone(),
                body,
            },
            redirect: binding.redirect.clone(),
            config: binding.config.clone(),
        });
    }

    fn resolve_form_for_submit(&self, target: NodeId) -> Option<NodeId> {
        if self
            .dom
            .tag_name(target)
            .map(|t| t.eq_ignore_ascii_case("form"))
            .unwrap_or(false)
        {
            return Some(target);
        }
        self.dom.find_ancestor_by_tag(target, "form")
    }

    fn uncheck_other_radios_in_group(&mut self, target: NodeId) -> Result<()> {
        let target_name = self.dom.attr(target, "name").unwrap_or_default();
        if target_name.is_empty() {
            return Ok(());
        }
        let target_form = self.resolve_form_for_submit(target);

        for node in self.dom.connected_elements() {
            if node == target {
                continue;
            }
            if !form::is_radio_input(&self.dom, node) {
                continue;
            }
            if self.dom.attr(node, "name").unwrap_or_default() != target_name {
                continue;
            }
            if self.resolve_form_for_submit(node) != target_form {
                continue;
            }
            if self.dom.checked(node) {
                self.dom.set_checked(node, false)?;
            }
        }
        Ok(())
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.text_content(target);
        if actual.trim() != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual: actual.trim().to_string(),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    pub fn assert_location(&self, expected: &str) -> Result<()> {
        let actual = self.location.clone().unwrap_or_default();
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: "location".into(),
                expected: expected.to_string(),
                actual,
                dom_snippet: String::new(),
            });
        }
        Ok(())
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.dom.dump_node(target))
    }

    pub fn dump_document(&self) -> String {
        self.dom.dump_node(self.dom.root())
    }

    fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.dom.dump_node(node_id), 200)
    }

    fn event_node_label(&self, node: NodeId) -> String {
        let Some(tag) = self.dom.tag_name(node) else {
            return "#document".into();
        };
        match self.dom.attr(node, "id") {
            Some(id) => format!("{tag}#{id}"),
            None => tag,
        }
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    /// Drains the diagnostic channel: fetch failures, dropped fragments,
    /// rebind no-ops, and (when tracing is on) event traces.
    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn set_diagnostics_stderr(&mut self, enabled: bool) {
        self.diagnostics_to_stderr = enabled;
    }

    pub fn set_diagnostics_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Dom(
                "set_diagnostics_limit requires at least 1 entry".into(),
            ));
        }
        self.diagnostics_limit = max_entries;
        while self.diagnostics.len() > self.diagnostics_limit {
            self.diagnostics.remove(0);
        }
        Ok(())
    }

    fn diagnostic(&mut self, message: String) {
        if self.diagnostics_to_stderr {
            eprintln!("[giftcard_form] {message}");
        }
        self.diagnostics.push(message);
        while self.diagnostics.len() > self.diagnostics_limit {
            self.diagnostics.remove(0);
        }
    }

    fn trace(&mut self, message: String) {
        if self.trace {
            self.diagnostic(message);
        }
    }
}

fn truncate_chars(src: &str, max_chars: usize) -> String {
    if src.chars().count() <= max_chars {
        src.to_string()
    } else {
        let mut out: String = src.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}
