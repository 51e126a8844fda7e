use super::*;

/// Attribute naming the submission endpoint, read once per bind.
pub const GIFT_CARD_ACTION_ATTR: &str = "data-action";
/// Attribute naming the navigation target for redirected submissions.
pub const GIFT_CARD_REDIRECT_ATTR: &str = "data-redirect";
/// Block the server-rendered fragment replaces.
pub const GIFT_CARD_BLOCK_SELECTOR: &str = ".setono-sylius-gift-card-gift-card-block";
/// Element the interceptor re-attaches to inside the new fragment.
pub const GIFT_CARD_REBIND_SELECTOR: &str = "#setono-sylius-gift-card-add-gift-card-to-order";

/// Wiring of one interceptor: which data attributes carry the URLs and which
/// selectors drive the replace-then-rebind step. The default is the gift card
/// block of a Sylius cart page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorConfig {
    pub action_attr: String,
    pub redirect_attr: String,
    pub block_selector: String,
    pub rebind_selector: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            action_attr: GIFT_CARD_ACTION_ATTR.into(),
            redirect_attr: GIFT_CARD_REDIRECT_ATTR.into(),
            block_selector: GIFT_CARD_BLOCK_SELECTOR.into(),
            rebind_selector: GIFT_CARD_REBIND_SELECTOR.into(),
        }
    }
}

impl InterceptorConfig {
    pub fn gift_card() -> Self {
        Self::default()
    }
}

/// Handle returned by a bind; also the disposer token for `unbind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub(crate) i64);

/// One installed interceptor. The action and redirect URLs are captured at
/// bind time; later attribute edits do not affect an existing binding.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) id: BindingId,
    pub(crate) node: NodeId,
    pub(crate) action: String,
    pub(crate) redirect: String,
    pub(crate) config: InterceptorConfig,
}
