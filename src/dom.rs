use super::*;

/// Handle to a node in the arena. Stable for the life of the harness; nodes
/// detached by fragment replacement keep their id but leave the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

/// Attributes keep source order so serialized markup matches the parsed
/// fragment byte for byte on canonical input.
#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) value: String,
    pub(crate) checked: bool,
    pub(crate) disabled: bool,
}

impl Element {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn has_class(&self, class_name: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class_name))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Dom {
    pub(crate) nodes: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
}

impl Dom {
    pub(crate) fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: Vec<(String, String)>,
    ) -> NodeId {
        let element = Element {
            value: attrs
                .iter()
                .find(|(key, _)| key == "value")
                .map(|(_, value)| value.clone())
                .unwrap_or_default(),
            checked: attrs.iter().any(|(key, _)| key == "checked"),
            disabled: attrs.iter().any(|(key, _)| key == "disabled"),
            tag_name,
            attrs,
        };
        let id = self.create_node(Some(parent), NodeType::Element(element));
        if let Some(id_attr) = self
            .element(id)
            .and_then(|element| element.attr("id").map(ToOwned::to_owned))
        {
            self.id_index.insert(id_attr, id);
        }
        id
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.create_node(Some(parent), NodeType::Text(text))
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<String> {
        self.element(node_id).map(|element| element.tag_name.clone())
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes[node_id.0].parent
    }

    pub(crate) fn parent_element(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        self.element(parent).map(|_| parent)
    }

    pub(crate) fn attr(&self, node_id: NodeId, name: &str) -> Option<String> {
        self.element(node_id)
            .and_then(|element| element.attr(name).map(ToOwned::to_owned))
    }

    pub(crate) fn value(&self, node_id: NodeId) -> String {
        self.element(node_id)
            .map(|element| element.value.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_value(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Dom("value target is not an element".into()))?;
        element.value = value.to_string();
        Ok(())
    }

    pub(crate) fn checked(&self, node_id: NodeId) -> bool {
        self.element(node_id)
            .map(|element| element.checked)
            .unwrap_or(false)
    }

    pub(crate) fn set_checked(&mut self, node_id: NodeId, checked: bool) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Dom("checked target is not an element".into()))?;
        element.checked = checked;
        Ok(())
    }

    pub(crate) fn disabled(&self, node_id: NodeId) -> bool {
        self.element(node_id)
            .map(|element| element.disabled)
            .unwrap_or(false)
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub(crate) fn is_connected(&self, node_id: NodeId) -> bool {
        let mut current = node_id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub(crate) fn find_ancestor_by_tag(&self, node_id: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = self.parent(node_id);
        while let Some(node) = current {
            if self
                .tag_name(node)
                .map(|t| t.eq_ignore_ascii_case(tag))
                .unwrap_or(false)
            {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document | NodeType::Element(_) => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
        }
    }

    /// Elements reachable from the document root, in document order. Detached
    /// subtrees are deliberately invisible here.
    pub(crate) fn connected_elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements(self.root, &mut out);
        out
    }

    fn collect_elements(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[node_id.0].children {
            if self.element(*child).is_some() {
                out.push(*child);
            }
            self.collect_elements(*child, out);
        }
    }

    pub(crate) fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let groups = selector::parse_selector_groups(selector)?;

        if let [group] = groups.as_slice() {
            if let [part] = group.as_slice() {
                if let Some(id) = part.step.id_only() {
                    return Ok(self.by_id(id).filter(|node| self.is_connected(*node)));
                }
            }
        }

        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let groups = selector::parse_selector_groups(selector)?;
        let mut out = Vec::new();
        for node in self.connected_elements() {
            if groups
                .iter()
                .any(|chain| selector::matches_chain(self, node, chain))
            {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// `outerHTML = fragment` semantics: splices the fragment's top-level
    /// nodes into the target's position and detaches the target subtree.
    pub(crate) fn replace_with_fragment(&mut self, target: NodeId, fragment: &Dom) -> Result<()> {
        let parent = self
            .parent(target)
            .ok_or_else(|| Error::Dom("cannot replace a detached node".into()))?;
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|child| *child == target)
            .ok_or_else(|| Error::Dom("replacement target is not a child of its parent".into()))?;

        let mut imported = Vec::new();
        for child in fragment.nodes[fragment.root.0].children.clone() {
            imported.push(self.import_subtree(fragment, child, Some(parent))?);
        }

        // import_subtree appended the new nodes; move them to the target's slot.
        self.nodes[parent.0]
            .children
            .retain(|child| !imported.contains(child));
        let mut children = std::mem::take(&mut self.nodes[parent.0].children);
        children.splice(position..position, imported);
        children.retain(|child| *child != target);
        self.nodes[parent.0].children = children;
        self.nodes[target.0].parent = None;

        self.rebuild_id_index();
        Ok(())
    }

    fn import_subtree(
        &mut self,
        source: &Dom,
        source_node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let node_type = match &source.nodes[source_node.0].node_type {
            NodeType::Document => {
                return Err(Error::Dom("cannot import a document node".into()));
            }
            NodeType::Element(element) => NodeType::Element(element.clone()),
            NodeType::Text(text) => NodeType::Text(text.clone()),
        };

        let node = self.create_node(parent, node_type);
        for child in &source.nodes[source_node.0].children {
            self.import_subtree(source, *child, Some(node))?;
        }
        Ok(node)
    }

    fn rebuild_id_index(&mut self) {
        self.id_index.clear();
        for node in self.connected_elements() {
            if let Some(id) = self.attr(node, "id") {
                self.id_index.entry(id).or_insert(node);
            }
        }
    }

    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(*child));
                }
                out
            }
            NodeType::Text(text) => html::escape_text(text),
            NodeType::Element(element) => {
                let mut out = String::new();
                out.push('<');
                out.push_str(&element.tag_name);
                for (key, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(key);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&html::escape_attr(value));
                        out.push('"');
                    }
                }
                out.push('>');
                if html::is_void_tag(&element.tag_name) {
                    return out;
                }
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(*child));
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
                out
            }
        }
    }

    /// Textarea values come from their text body; select values from the
    /// selected (or first) option. Input values were captured at creation.
    pub(crate) fn initialize_form_control_values(&mut self) {
        for node in self.connected_elements() {
            let Some(tag) = self.tag_name(node) else {
                continue;
            };
            if tag.eq_ignore_ascii_case("textarea") {
                let text = self.text_content(node);
                if let Some(element) = self.element_mut(node) {
                    element.value = text;
                }
                continue;
            }
            if tag.eq_ignore_ascii_case("select") {
                let options: Vec<NodeId> = self.nodes[node.0]
                    .children
                    .iter()
                    .copied()
                    .filter(|child| {
                        self.tag_name(*child)
                            .map(|t| t.eq_ignore_ascii_case("option"))
                            .unwrap_or(false)
                    })
                    .collect();
                let chosen = options
                    .iter()
                    .copied()
                    .find(|option| self.attr(*option, "selected").is_some())
                    .or_else(|| options.first().copied());
                let value = chosen.map(|option| self.option_value(option)).unwrap_or_default();
                if let Some(element) = self.element_mut(node) {
                    element.value = value;
                }
            }
        }
    }

    fn option_value(&self, option: NodeId) -> String {
        match self.attr(option, "value") {
            Some(value) => value,
            None => self.text_content(option).trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;

    #[test]
    fn replace_with_fragment_swaps_subtree_in_place() -> Result<()> {
        let mut dom = parse_html(
            r#"<div id="before">a</div><div class="block"><span>old</span></div><div id="after">b</div>"#,
        )?;
        let block = dom.query_selector(".block")?.unwrap();
        let fragment = parse_html(r#"<div class="block"><span>new</span></div>"#)?;
        dom.replace_with_fragment(block, &fragment)?;

        assert_eq!(
            dom.dump_node(dom.root()),
            r#"<div id="before">a</div><div class="block"><span>new</span></div><div id="after">b</div>"#
        );
        assert!(!dom.is_connected(block));
        Ok(())
    }

    #[test]
    fn id_index_follows_replacement() -> Result<()> {
        let mut dom = parse_html(r#"<div class="block"><form id="f"></form></div>"#)?;
        let old_form = dom.query_selector("#f")?.unwrap();
        let block = dom.query_selector(".block")?.unwrap();
        let fragment = parse_html(r#"<div class="block"><form id="f"></form></div>"#)?;
        dom.replace_with_fragment(block, &fragment)?;

        let new_form = dom.query_selector("#f")?.unwrap();
        assert_ne!(old_form, new_form);
        assert!(dom.is_connected(new_form));
        Ok(())
    }

    #[test]
    fn replacement_fragment_may_have_multiple_roots() -> Result<()> {
        let mut dom = parse_html(r#"<div class="block">x</div>"#)?;
        let block = dom.query_selector(".block")?.unwrap();
        let fragment = parse_html("<p>one</p><p>two</p>")?;
        dom.replace_with_fragment(block, &fragment)?;
        assert_eq!(dom.dump_node(dom.root()), "<p>one</p><p>two</p>");
        Ok(())
    }

    #[test]
    fn replacing_a_detached_node_is_an_error() -> Result<()> {
        let mut dom = parse_html(r#"<div class="block">x</div>"#)?;
        let block = dom.query_selector(".block")?.unwrap();
        let fragment = parse_html("<p>y</p>")?;
        dom.replace_with_fragment(block, &fragment)?;
        let err = dom.replace_with_fragment(block, &fragment).unwrap_err();
        assert!(matches!(err, Error::Dom(_)));
        Ok(())
    }

    #[test]
    fn query_selector_all_collects_matches_in_document_order() -> Result<()> {
        let dom = parse_html(
            r#"<input type="radio" name="plan" value="a" checked><div><input type="radio" name="plan" value="b"></div><input type="radio" name="other" value="c">"#,
        )?;
        let radios = dom.query_selector_all("input[name=plan]")?;
        assert_eq!(radios.len(), 2);
        let values: Vec<String> = radios
            .iter()
            .filter_map(|node| dom.attr(*node, "value"))
            .collect();
        assert_eq!(values, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(dom.query_selector("input[name=plan]")?, Some(radios[0]));
        Ok(())
    }

    #[test]
    fn select_value_tracks_selected_option() -> Result<()> {
        let dom = parse_html(
            "<select name='currency'><option value='EUR'>Euro</option><option value='USD' selected>Dollar</option></select>",
        )?;
        let select = dom.query_selector("select")?.unwrap();
        assert_eq!(dom.value(select), "USD");
        Ok(())
    }
}
