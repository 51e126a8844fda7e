use giftcard_form::{
    FetchResponse, GIFT_CARD_BLOCK_SELECTOR, GIFT_CARD_REBIND_SELECTOR, Harness, InterceptorConfig,
    ScriptedFetch,
};

const CART_PAGE: &str = r#"
    <div class="setono-sylius-gift-card-gift-card-block">
      <form id="setono-sylius-gift-card-add-gift-card-to-order"
            data-action="/cart/add-gift-card" data-redirect="/cart">
        <input name="code" value="GC-7">
      </form>
    </div>
    "#;

#[test]
fn rejected_fetch_only_reaches_the_diagnostic_channel() -> giftcard_form::Result<()> {
    let fetch = ScriptedFetch::new();
    fetch.push_error("connection refused");
    let mut harness = Harness::from_html_with(CART_PAGE, Box::new(fetch.clone()))?;
    harness.bind_add_to_order(GIFT_CARD_REBIND_SELECTOR)?;
    let document_before = harness.dump_document();

    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    harness.flush()?;

    assert!(harness.location().is_none());
    assert_eq!(harness.dump_document(), document_before);

    let diagnostics = harness.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].contains("connection refused"), "{diagnostics:?}");

    // The failure is not sticky: the binding still works afterwards.
    fetch.push_response(FetchResponse::redirect());
    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    harness.flush()?;
    harness.assert_location("/cart")?;
    Ok(())
}

#[test]
fn fragment_without_block_target_is_dropped_with_a_diagnostic() -> giftcard_form::Result<()> {
    let fetch = ScriptedFetch::new();
    fetch.push_response(FetchResponse::fragment("<p>late</p>"));
    let page_without_block = r#"
        <form id="setono-sylius-gift-card-add-gift-card-to-order"
              data-action="/cart/add-gift-card" data-redirect="/cart">
          <input name="code" value="X">
        </form>
        "#;
    let mut harness = Harness::from_html_with(page_without_block, Box::new(fetch))?;
    harness.bind_add_to_order(GIFT_CARD_REBIND_SELECTOR)?;
    let document_before = harness.dump_document();

    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    harness.flush()?;

    assert_eq!(harness.dump_document(), document_before);
    let diagnostics = harness.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(
        diagnostics[0].contains(GIFT_CARD_BLOCK_SELECTOR),
        "{diagnostics:?}"
    );
    Ok(())
}

#[test]
fn missing_rebind_target_is_a_warned_no_op() -> giftcard_form::Result<()> {
    let fragment = r#"<div class="setono-sylius-gift-card-gift-card-block"><p>done</p></div>"#;
    let fetch = ScriptedFetch::new();
    fetch.push_response(FetchResponse::fragment(fragment));
    let mut harness = Harness::from_html_with(CART_PAGE, Box::new(fetch.clone()))?;
    harness.bind_add_to_order(GIFT_CARD_REBIND_SELECTOR)?;

    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    harness.flush()?;

    // The replacement itself still happened.
    assert_eq!(harness.dump_dom(GIFT_CARD_BLOCK_SELECTOR)?, fragment);
    assert_eq!(harness.active_bindings(), 0);

    let diagnostics = harness.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(
        diagnostics[0].contains(GIFT_CARD_REBIND_SELECTOR),
        "{diagnostics:?}"
    );
    Ok(())
}

#[test]
fn rebind_target_without_data_attributes_is_not_re_armed() -> giftcard_form::Result<()> {
    let fragment = concat!(
        r#"<div class="setono-sylius-gift-card-gift-card-block">"#,
        r#"<form id="setono-sylius-gift-card-add-gift-card-to-order"></form></div>"#
    );
    let fetch = ScriptedFetch::new();
    fetch.push_response(FetchResponse::fragment(fragment));
    let mut harness = Harness::from_html_with(CART_PAGE, Box::new(fetch.clone()))?;
    harness.bind_add_to_order(GIFT_CARD_REBIND_SELECTOR)?;

    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    harness.flush()?;

    assert_eq!(harness.active_bindings(), 0);
    let diagnostics = harness.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].contains("data-action"), "{diagnostics:?}");

    // A further submit on the orphaned form queues nothing.
    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    assert!(harness.pending_fetches().is_empty());
    assert!(fetch.requests().len() == 1);
    Ok(())
}

#[test]
fn unparsable_fragment_is_logged_and_skipped() -> giftcard_form::Result<()> {
    let fetch = ScriptedFetch::new();
    fetch.push_response(FetchResponse::fragment("<div><!-- truncated"));
    let mut harness = Harness::from_html_with(CART_PAGE, Box::new(fetch))?;
    harness.bind_add_to_order(GIFT_CARD_REBIND_SELECTOR)?;
    let document_before = harness.dump_document();

    harness.submit(GIFT_CARD_REBIND_SELECTOR)?;
    harness.flush()?;

    assert_eq!(harness.dump_document(), document_before);
    let diagnostics = harness.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].contains("did not parse"), "{diagnostics:?}");
    Ok(())
}

#[test]
fn custom_config_drives_alternate_selectors_and_attributes() -> giftcard_form::Result<()> {
    let page = r#"
        <section class="promo-slot">
          <form id="promo" data-post-url="/promo/apply" data-done-url="/promo/thanks">
            <input name="voucher" value="SPRING">
          </form>
        </section>
        "#;
    let config = InterceptorConfig {
        action_attr: "data-post-url".into(),
        redirect_attr: "data-done-url".into(),
        block_selector: ".promo-slot".into(),
        rebind_selector: "#promo".into(),
    };
    let fetch = ScriptedFetch::new();
    fetch.push_response(FetchResponse::redirect());
    let mut harness = Harness::from_html_with(page, Box::new(fetch.clone()))?;
    harness.bind_with_config("#promo", config)?;

    harness.submit("#promo")?;
    harness.flush()?;

    harness.assert_location("/promo/thanks")?;
    assert_eq!(fetch.requests()[0].url, "/promo/apply");
    assert_eq!(fetch.requests()[0].body, "voucher=SPRING");
    Ok(())
}
