// Captured page environment: dynamic value graph, DOM snapshot, and the
// storage/cookie ports the bypass stage mutates.
use anyhow::{bail, Context, Result};
use fxhash::FxHashMap;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// A property getter threw (proxy trap, hostile getter).
    #[error("property access failed: {0}")]
    Access(String),
    /// Stringification hit a cycle or an unserializable value.
    #[error("not serializable: {0}")]
    Stringify(String),
}

/// A value captured from the target page's runtime. Objects and arrays are
/// shared and interior-mutable so that aliased references (router reachable
/// both from a DOM marker and from a global) stay aliased after capture.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<FunctionValue>),
    Promise,
}

/// A captured function: its name, its source text (what `toString()` would
/// have produced), and an optional canned return value so capability probes
/// like `router.getRoutes()` stay callable against the snapshot.
pub struct FunctionValue {
    pub name: String,
    pub source: String,
    pub returns: Option<Value>,
}

enum Slot {
    Plain(Value),
    Throws(String),
}

struct ObjectData {
    class: Option<String>,
    entries: Vec<(String, Slot)>,
}

#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<Vec<Value>>>);

impl ObjectRef {
    pub fn new() -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            class: None,
            entries: Vec::new(),
        })))
    }

    pub fn with_class(name: &str) -> Self {
        let obj = Self::new();
        obj.0.borrow_mut().class = Some(name.to_string());
        obj
    }

    /// Builder-style insert for tests and snapshot construction.
    pub fn with(self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn class(&self) -> Option<String> {
        self.0.borrow().class.clone()
    }

    /// Reads a property. `Ok(None)` means the key is absent; `Err` means the
    /// captured getter throws on access.
    pub fn get(&self, key: &str) -> Result<Option<Value>, PageError> {
        let data = self.0.borrow();
        for (k, slot) in &data.entries {
            if k == key {
                return match slot {
                    Slot::Plain(v) => Ok(Some(v.clone())),
                    Slot::Throws(msg) => Err(PageError::Access(msg.clone())),
                };
            }
        }
        Ok(None)
    }

    /// Writes a property, replacing a throwing slot if one was there.
    pub fn set(&self, key: &str, value: Value) {
        let mut data = self.0.borrow_mut();
        for (k, slot) in data.entries.iter_mut() {
            if k == key {
                *slot = Slot::Plain(value);
                return;
            }
        }
        data.entries.push((key.to_string(), Slot::Plain(value)));
    }

    /// Installs a property whose access throws, mimicking a proxy trap.
    pub fn set_throwing(&self, key: &str, message: &str) {
        let mut data = self.0.borrow_mut();
        data.entries.retain(|(k, _)| k != key);
        data.entries
            .push((key.to_string(), Slot::Throws(message.to_string())));
    }

    pub fn with_throwing(self, key: &str, message: &str) -> Self {
        self.set_throwing(key, message);
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        ArrayRef(Rc::new(RefCell::new(items)))
    }

    pub fn items(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `array.length = 0` analog used when guard arrays are truncated.
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn int(i: i64) -> Value {
        Value::Int(i)
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(ArrayRef::new(items))
    }

    pub fn function(name: &str, source: &str) -> Value {
        Value::Function(Rc::new(FunctionValue {
            name: name.to_string(),
            source: source.to_string(),
            returns: None,
        }))
    }

    pub fn function_returning(name: &str, returns: Value) -> Value {
        Value::Function(Rc::new(FunctionValue {
            name: name.to_string(),
            source: String::new(),
            returns: Some(returns),
        }))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionValue> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Calls a captured function, yielding its canned return value.
    pub fn call(&self) -> Value {
        match self {
            Value::Function(f) => f.returns.clone().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Follows a property path, swallowing access faults and type mismatches.
    pub fn get_path(&self, path: &[&str]) -> Option<Value> {
        let mut current = self.clone();
        for key in path {
            let obj = current.as_object()?.clone();
            current = obj.get(key).ok().flatten()?;
        }
        Some(current)
    }

    /// Like `get_path` but surfaces access faults to the caller.
    pub fn try_path(&self, path: &[&str]) -> Result<Option<Value>, PageError> {
        let mut current = self.clone();
        for key in path {
            let obj = match current.as_object() {
                Some(o) => o.clone(),
                None => return Ok(None),
            };
            current = match obj.get(key)? {
                Some(v) => v,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(a) => write!(f, "[array; {}]", a.len()),
            Value::Object(o) => match o.class() {
                Some(c) => write!(f, "[object {}]", c),
                None => write!(f, "[object; {} keys]", o.len()),
            },
            Value::Function(fv) => write!(f, "[function {}]", fv.name),
            Value::Promise => write!(f, "[promise]"),
        }
    }
}

/// JSON.stringify analog over captured values. Function properties are
/// omitted from objects and become null inside arrays; a cycle or a
/// throwing slot aborts with an error the caller treats as a skip.
pub fn stringify(value: &Value) -> Result<String, PageError> {
    let mut out = String::new();
    let mut stack: Vec<usize> = Vec::new();
    write_value(value, &mut out, &mut stack)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut String, stack: &mut Vec<usize>) -> Result<(), PageError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => {
            if !f.is_finite() {
                out.push_str("null");
            } else if f.fract() == 0.0 && f.abs() < 1e15 {
                out.push_str(&(*f as i64).to_string());
            } else {
                out.push_str(&f.to_string());
            }
        }
        Value::Str(s) => {
            out.push_str(&serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into()))
        }
        Value::Promise => out.push_str("{}"),
        Value::Function(_) => {
            return Err(PageError::Stringify("function value".into()));
        }
        Value::Array(arr) => {
            if stack.contains(&arr.ptr_id()) {
                return Err(PageError::Stringify("circular structure".into()));
            }
            stack.push(arr.ptr_id());
            out.push('[');
            for (i, item) in arr.items().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if matches!(item, Value::Function(_)) {
                    out.push_str("null");
                } else {
                    write_value(item, out, stack)?;
                }
            }
            out.push(']');
            stack.pop();
        }
        Value::Object(obj) => {
            if stack.contains(&obj.ptr_id()) {
                return Err(PageError::Stringify("circular structure".into()));
            }
            stack.push(obj.ptr_id());
            out.push('{');
            let mut first = true;
            for key in obj.keys() {
                let v = obj.get(&key)?;
                let v = match v {
                    Some(Value::Function(_)) | None => continue,
                    Some(v) => v,
                };
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&serde_json::to_string(&key).unwrap_or_else(|_| "\"\"".into()));
                out.push(':');
                write_value(&v, out, stack)?;
            }
            out.push('}');
            stack.pop();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DOM snapshot

pub const ELEMENT_NODE: u8 = 1;
pub const TEXT_NODE: u8 = 3;
pub const COMMENT_NODE: u8 = 8;

pub struct NodeData {
    pub node_type: u8,
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    /// Framework-internal marker properties attached to the node.
    pub props: ObjectRef,
    pub children: Vec<NodeRef>,
    pub text: String,
}

#[derive(Clone)]
pub struct NodeRef(Rc<NodeData>);

impl NodeRef {
    pub fn element(tag: &str) -> Self {
        NodeRef(Rc::new(NodeData {
            node_type: ELEMENT_NODE,
            tag: tag.to_string(),
            attrs: Vec::new(),
            props: ObjectRef::new(),
            children: Vec::new(),
            text: String::new(),
        }))
    }

    pub fn build(
        tag: &str,
        attrs: Vec<(String, String)>,
        props: ObjectRef,
        children: Vec<NodeRef>,
    ) -> Self {
        NodeRef(Rc::new(NodeData {
            node_type: ELEMENT_NODE,
            tag: tag.to_string(),
            attrs,
            props,
            children,
            text: String::new(),
        }))
    }

    pub fn text(content: &str) -> Self {
        NodeRef(Rc::new(NodeData {
            node_type: TEXT_NODE,
            tag: String::new(),
            attrs: Vec::new(),
            props: ObjectRef::new(),
            children: Vec::new(),
            text: content.to_string(),
        }))
    }

    pub fn comment(content: &str) -> Self {
        NodeRef(Rc::new(NodeData {
            node_type: COMMENT_NODE,
            tag: String::new(),
            attrs: Vec::new(),
            props: ObjectRef::new(),
            children: Vec::new(),
            text: content.to_string(),
        }))
    }

    pub fn node_type(&self) -> u8 {
        self.0.node_type
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn props(&self) -> &ObjectRef {
        &self.0.props
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.0.children
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.0
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of direct text children (script bodies).
    pub fn text_content(&self) -> String {
        if self.0.node_type == TEXT_NODE {
            return self.0.text.clone();
        }
        let mut out = String::new();
        for child in &self.0.children {
            out.push_str(&child.text_content());
        }
        out
    }

    /// Serializes the subtree back to markup. Text is emitted raw so that
    /// inline script bodies survive for pattern mining.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self.0.node_type {
            TEXT_NODE => out.push_str(&self.0.text),
            COMMENT_NODE => {
                out.push_str("<!--");
                out.push_str(&self.0.text);
                out.push_str("-->");
            }
            _ => {
                out.push('<');
                out.push_str(&self.0.tag);
                for (k, v) in &self.0.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(v);
                    out.push('"');
                }
                out.push('>');
                for child in &self.0.children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&self.0.tag);
                out.push('>');
            }
        }
    }

    /// Depth-first walk collecting every node matching the predicate.
    pub fn select(&self, pred: &dyn Fn(&NodeRef) -> bool) -> Vec<NodeRef> {
        let mut found = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if pred(&node) {
                found.push(node.clone());
            }
            for child in node.children().iter().rev() {
                stack.push(child.clone());
            }
        }
        found
    }
}

/// A `<script>` tag lifted out of the DOM.
pub struct ScriptTag {
    pub src: Option<String>,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Environment ports

/// localStorage/sessionStorage stand-in, shared so mutations made during the
/// bypass stage are observable by the caller.
#[derive(Clone, Default)]
pub struct StoragePort(Rc<RefCell<Vec<(String, String)>>>);

impl StoragePort {
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set_item(&self, key: &str, value: &str) {
        let mut items = self.0.borrow_mut();
        for (k, v) in items.iter_mut() {
            if k == key {
                *v = value.to_string();
                return;
            }
        }
        items.push((key.to_string(), value.to_string()));
    }
}

/// document.cookie write port.
#[derive(Clone, Default)]
pub struct CookieJar(Rc<RefCell<Vec<String>>>);

impl CookieJar {
    pub fn set(&self, cookie: &str) {
        self.0.borrow_mut().push(cookie.to_string());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// Page snapshot

/// Everything the engine sees of one captured page.
pub struct PageSnapshot {
    pub url: String,
    pub dom: NodeRef,
    /// The captured `window` object graph.
    pub globals: ObjectRef,
    pub local_storage: StoragePort,
    pub session_storage: StoragePort,
    pub cookies: CookieJar,
    /// Resource URLs the capture saw loaded (performance entries).
    pub resources: Vec<String>,
}

impl PageSnapshot {
    pub fn new(url: &str, dom: NodeRef) -> Self {
        PageSnapshot {
            url: url.to_string(),
            dom,
            globals: ObjectRef::new(),
            local_storage: StoragePort::default(),
            session_storage: StoragePort::default(),
            cookies: CookieJar::default(),
            resources: Vec::new(),
        }
    }

    /// scheme://host[:port] of the captured URL, empty when unparseable.
    pub fn origin(&self) -> String {
        match self.url.find("://") {
            Some(scheme_end) => {
                let rest = &self.url[scheme_end + 3..];
                let host_end = rest.find('/').unwrap_or(rest.len());
                format!("{}{}", &self.url[..scheme_end + 3], &rest[..host_end])
            }
            None => String::new(),
        }
    }

    /// Pathname of the captured URL without query or fragment.
    pub fn current_path(&self) -> String {
        let rest = match self.url.find("://") {
            Some(scheme_end) => {
                let rest = &self.url[scheme_end + 3..];
                match rest.find('/') {
                    Some(i) => &rest[i..],
                    None => "/",
                }
            }
            None => self.url.as_str(),
        };
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        let path = &rest[..end];
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }

    pub fn scripts(&self) -> Vec<ScriptTag> {
        self.dom
            .select(&|n| n.node_type() == ELEMENT_NODE && n.tag().eq_ignore_ascii_case("script"))
            .into_iter()
            .map(|n| ScriptTag {
                src: n.attr("src").map(str::to_string),
                text: n.text_content(),
            })
            .collect()
    }

    /// href values of every anchor element, in document order.
    pub fn anchor_hrefs(&self) -> Vec<String> {
        self.dom
            .select(&|n| n.node_type() == ELEMENT_NODE && n.tag().eq_ignore_ascii_case("a"))
            .into_iter()
            .filter_map(|n| n.attr("href").map(str::to_string))
            .collect()
    }

    pub fn outer_html(&self) -> String {
        self.dom.outer_html()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Decodes a snapshot capture. Special keys inside captured values:
    /// `$fn` (function), `$promise`, `$throws` (throwing property),
    /// `$class` (constructor tag), `$ref` (alias into the `shared` table).
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: Json = serde_json::from_str(text).context("snapshot is not valid JSON")?;
        let root = raw
            .as_object()
            .context("snapshot root must be an object")?;

        // Shared objects decode in two passes so aliases and cycles resolve.
        let mut shared: FxHashMap<String, ObjectRef> = FxHashMap::default();
        if let Some(Json::Object(table)) = root.get("shared") {
            for (name, spec) in table {
                let class = spec
                    .get("$class")
                    .and_then(Json::as_str)
                    .map(ObjectRef::with_class)
                    .unwrap_or_default();
                shared.insert(name.clone(), class);
            }
            for (name, spec) in table {
                let obj = shared[name].clone();
                let fields = spec
                    .as_object()
                    .with_context(|| format!("shared entry {} must be an object", name))?;
                fill_object(&obj, fields, &shared)?;
            }
        }

        let url = root
            .get("url")
            .and_then(Json::as_str)
            .unwrap_or("")
            .to_string();
        let dom = match root.get("dom") {
            Some(spec) => decode_node(spec, &shared)?,
            None => NodeRef::element("body"),
        };

        let mut page = PageSnapshot::new(&url, dom);

        if let Some(Json::Object(globals)) = root.get("globals") {
            fill_object(&page.globals, globals, &shared)?;
        }
        if let Some(Json::Object(items)) = root.get("localStorage") {
            for (k, v) in items {
                page.local_storage.set_item(k, v.as_str().unwrap_or_default());
            }
        }
        if let Some(Json::Object(items)) = root.get("sessionStorage") {
            for (k, v) in items {
                page.session_storage
                    .set_item(k, v.as_str().unwrap_or_default());
            }
        }
        if let Some(Json::Array(cookies)) = root.get("cookies") {
            for c in cookies {
                if let Some(c) = c.as_str() {
                    page.cookies.set(c);
                }
            }
        }
        if let Some(Json::Array(resources)) = root.get("resources") {
            page.resources = resources
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect();
        }

        Ok(page)
    }
}

fn fill_object(
    obj: &ObjectRef,
    fields: &serde_json::Map<String, Json>,
    shared: &FxHashMap<String, ObjectRef>,
) -> Result<()> {
    for (key, spec) in fields {
        if key == "$class" {
            continue;
        }
        if let Some(msg) = throws_marker(spec) {
            obj.set_throwing(key, msg);
            continue;
        }
        obj.set(key, decode_value(spec, shared)?);
    }
    Ok(())
}

fn throws_marker(spec: &Json) -> Option<&str> {
    spec.as_object()?.get("$throws")?.as_str()
}

fn decode_value(spec: &Json, shared: &FxHashMap<String, ObjectRef>) -> Result<Value> {
    match spec {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else {
                Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(decode_value(item, shared)?);
            }
            Ok(Value::array(out))
        }
        Json::Object(fields) => {
            if let Some(name) = fields.get("$ref").and_then(Json::as_str) {
                let obj = shared
                    .get(name)
                    .with_context(|| format!("unknown shared ref {}", name))?;
                return Ok(Value::Object(obj.clone()));
            }
            if let Some(fn_spec) = fields.get("$fn") {
                return decode_function(fn_spec, shared);
            }
            if fields.get("$promise").is_some() {
                return Ok(Value::Promise);
            }
            let obj = match fields.get("$class").and_then(Json::as_str) {
                Some(class) => ObjectRef::with_class(class),
                None => ObjectRef::new(),
            };
            fill_object(&obj, fields, shared)?;
            Ok(Value::Object(obj))
        }
    }
}

fn decode_node(spec: &Json, shared: &FxHashMap<String, ObjectRef>) -> Result<NodeRef> {
    let fields = spec.as_object().context("DOM node must be an object")?;
    if let Some(text) = fields.get("text").and_then(Json::as_str) {
        return Ok(NodeRef::text(text));
    }
    if let Some(comment) = fields.get("comment").and_then(Json::as_str) {
        return Ok(NodeRef::comment(comment));
    }
    let tag = fields
        .get("tag")
        .and_then(Json::as_str)
        .context("element node needs a tag")?;
    let mut attrs = Vec::new();
    if let Some(Json::Object(raw)) = fields.get("attrs") {
        for (k, v) in raw {
            attrs.push((k.clone(), v.as_str().unwrap_or_default().to_string()));
        }
    }
    let props = ObjectRef::new();
    if let Some(Json::Object(raw)) = fields.get("props") {
        fill_object(&props, raw, shared)?;
    }
    let mut children = Vec::new();
    if let Some(Json::Array(raw)) = fields.get("children") {
        for child in raw {
            children.push(decode_node(child, shared)?);
        }
    }
    Ok(NodeRef::build(tag, attrs, props, children))
}

fn decode_function(spec: &Json, shared: &FxHashMap<String, ObjectRef>) -> Result<Value> {
    match spec {
        // "$fn": true — anonymous captured function with no body on record
        Json::Bool(_) => Ok(Value::function("", "")),
        Json::Object(fields) => {
            let name = fields.get("name").and_then(Json::as_str).unwrap_or("");
            let source = fields.get("source").and_then(Json::as_str).unwrap_or("");
            let returns = match fields.get("returns") {
                Some(r) => Some(decode_value(r, shared)?),
                None => None,
            };
            Ok(Value::Function(Rc::new(FunctionValue {
                name: name.to_string(),
                source: source.to_string(),
                returns,
            })))
        }
        other => bail!("bad $fn spec: {}", other),
    }
}
