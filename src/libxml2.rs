//! LibXML2 / LibXSLT FFI engine
//!
//! Direct FFI bindings to the system `libxml2` and `libxslt` libraries, wrapped in
//! the [`XmlEngine`] capability.
//!
//! ## Thread Safety Strategy
//!
//! - **Compiled artifacts** (`xsltStylesheet`, `xmlXPathCompExpr`) are read-only once
//!   built and are shared across threads behind `Arc`.
//! - **Execution state** (`xsltTransformContext`, `xmlXPathContext`, parsed documents)
//!   is created per call and never leaves the calling thread.
//! - **Diagnostics** are collected through libxml2's structured error handler, which
//!   is per-thread state. Every entry point installs the handler, runs to completion
//!   on the same thread and removes it again.
//! - **libxslt messages** (compile errors, `xsl:message`) go through libxslt's
//!   process-wide generic error callback. It is installed once, points at a small C
//!   trampoline that formats the variadic arguments, and lands in the same
//!   per-thread buffer as the structured diagnostics.
//!
//! The query language is the XPath 1.0 subset of XQuery that libxml2 evaluates, with
//! external variables bound by name.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::Once;

use libc::{FILE, c_char, c_double, c_int, c_void};

use crate::engine::{Diagnostic, Severity, XmlEngine, render_diagnostics};
use crate::error::{EngineError, EngineResult};
use crate::request::Params;
use crate::source::LoadedSource;

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are NOT thread-safe, so they run exactly once.
static LIBXML2_INIT: Once = Once::new();

/// Prefix of every query and path result.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// Parser options (xmlParserOption)
const XML_PARSE_NOENT: c_int = 1 << 1;
const XML_PARSE_DTDLOAD: c_int = 1 << 2;
const XML_PARSE_DTDATTR: c_int = 1 << 3;
const XML_PARSE_NOCDATA: c_int = 1 << 14;

/// Options libxslt itself uses for stylesheets and source documents.
///
/// Entity substitution and external DTD loading are intentionally on for inline
/// input too: documents may pull in local entities and DTDs just like `xsltproc`.
const XSLT_PARSE_OPTIONS: c_int =
    XML_PARSE_NOENT | XML_PARSE_DTDLOAD | XML_PARSE_DTDATTR | XML_PARSE_NOCDATA;

// xmlErrorLevel
const XML_ERR_WARNING: c_int = 1;
const XML_ERR_ERROR: c_int = 2;
const XML_ERR_FATAL: c_int = 3;

// xmlXPathObjectType
const XPATH_NODESET: c_int = 1;
const XPATH_BOOLEAN: c_int = 2;
const XPATH_NUMBER: c_int = 3;
const XPATH_STRING: c_int = 4;
const XPATH_XSLT_TREE: c_int = 9;

// xmlElementType
const XML_ATTRIBUTE_NODE: c_int = 2;
const XML_DOCUMENT_NODE: c_int = 9;
const XML_HTML_DOCUMENT_NODE: c_int = 13;
const XML_NAMESPACE_DECL: c_int = 18;

// Opaque libxml2 / libxslt structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDtd {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathContext {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathCompExpr {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XsltStylesheet {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XsltTransformContext {
    _private: [u8; 0],
}

/// Leading fields shared by `xmlNode`, `xmlAttr` and `xmlDoc`.
#[allow(dead_code)]
#[repr(C)]
pub struct XmlNode {
    _private: *mut c_void,
    node_type: c_int,
}

/// Leading fields of `xmlNs`, used for namespace nodes in node sets.
#[allow(dead_code)]
#[repr(C)]
struct XmlNs {
    next: *mut XmlNs,
    node_type: c_int,
    href: *const c_char,
    prefix: *const c_char,
}

#[allow(dead_code)]
#[repr(C)]
struct XmlNodeSet {
    node_nr: c_int,
    node_max: c_int,
    node_tab: *mut *mut XmlNode,
}

#[allow(dead_code)]
#[repr(C)]
pub struct XmlXPathObject {
    object_type: c_int,
    nodesetval: *mut XmlNodeSet,
    boolval: c_int,
    floatval: c_double,
    stringval: *mut c_char,
    user: *mut c_void,
    index: c_int,
    user2: *mut c_void,
    index2: c_int,
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlGenericErrorFunc =
    Option<unsafe extern "C" fn(ctx: *mut c_void, msg: *const c_char, ...)>;

type ErrorSink = Option<unsafe extern "C" fn(fragment: *const c_char)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Documents
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlDocGetRootElement(doc: *const XmlDoc) -> *mut XmlNode;
    pub fn xmlNodeGetContent(node: *const XmlNode) -> *mut c_char;

    // DTD validation
    pub fn xmlGetIntSubset(doc: *const XmlDoc) -> *mut XmlDtd;
    pub fn xmlNewValidCtxt() -> *mut XmlValidCtxt;
    pub fn xmlFreeValidCtxt(ctxt: *mut XmlValidCtxt);
    pub fn xmlValidateDocument(ctxt: *mut XmlValidCtxt, doc: *mut XmlDoc) -> c_int;

    // Serialization buffers
    pub fn xmlBufferCreate() -> *mut XmlBuffer;
    pub fn xmlBufferFree(buf: *mut XmlBuffer);
    pub fn xmlBufferContent(buf: *const XmlBuffer) -> *const c_char;
    pub fn xmlBufferLength(buf: *const XmlBuffer) -> c_int;
    pub fn xmlNodeDump(
        buf: *mut XmlBuffer,
        doc: *mut XmlDoc,
        node: *mut XmlNode,
        level: c_int,
        format: c_int,
    ) -> c_int;

    // XPath
    pub fn xmlXPathCompile(expr: *const c_char) -> *mut XmlXPathCompExpr;
    pub fn xmlXPathFreeCompExpr(comp: *mut XmlXPathCompExpr);
    pub fn xmlXPathNewContext(doc: *mut XmlDoc) -> *mut XmlXPathContext;
    pub fn xmlXPathFreeContext(ctxt: *mut XmlXPathContext);
    pub fn xmlXPathSetContextNode(node: *mut XmlNode, ctxt: *mut XmlXPathContext) -> c_int;
    pub fn xmlXPathRegisterVariable(
        ctxt: *mut XmlXPathContext,
        name: *const c_char,
        value: *mut XmlXPathObject,
    ) -> c_int;
    pub fn xmlXPathNewCString(value: *const c_char) -> *mut XmlXPathObject;
    pub fn xmlXPathCompiledEval(
        comp: *mut XmlXPathCompExpr,
        ctxt: *mut XmlXPathContext,
    ) -> *mut XmlXPathObject;
    pub fn xmlXPathFreeObject(obj: *mut XmlXPathObject);
}

// External libxslt FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxslt"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xslt"))]
unsafe extern "C" {
    pub fn xsltParseStylesheetDoc(doc: *mut XmlDoc) -> *mut XsltStylesheet;
    pub fn xsltFreeStylesheet(style: *mut XsltStylesheet);
    pub fn xsltNewTransformContext(
        style: *mut XsltStylesheet,
        doc: *mut XmlDoc,
    ) -> *mut XsltTransformContext;
    pub fn xsltFreeTransformContext(ctxt: *mut XsltTransformContext);
    pub fn xsltQuoteOneUserParam(
        ctxt: *mut XsltTransformContext,
        name: *const c_char,
        value: *const c_char,
    ) -> c_int;
    pub fn xsltApplyStylesheetUser(
        style: *mut XsltStylesheet,
        doc: *mut XmlDoc,
        params: *const *const c_char,
        output: *const c_char,
        profile: *mut FILE,
        user_ctxt: *mut XsltTransformContext,
    ) -> *mut XmlDoc;
    pub fn xsltSetGenericErrorFunc(ctx: *mut c_void, handler: XmlGenericErrorFunc);
    pub fn xsltSaveResultToString(
        doc_txt_ptr: *mut *mut c_char,
        doc_txt_len: *mut c_int,
        result: *mut XmlDoc,
        style: *mut XsltStylesheet,
    ) -> c_int;
}

// C trampoline compiled by build.rs
unsafe extern "C" {
    fn xml_worker_set_error_sink(sink: ErrorSink);
    fn xml_worker_generic_error(ctx: *mut c_void, msg: *const c_char, ...);
}

thread_local! {
    static CAPTURED: RefCell<Vec<Diagnostic>> = const { RefCell::new(Vec::new()) };
    /// libxslt text not yet terminated by a newline
    static PENDING_XSLT: RefCell<String> = const { RefCell::new(String::new()) };
}

fn push_captured(diagnostic: Diagnostic) {
    // Never panic across the FFI boundary
    let _ = CAPTURED.try_with(|captured| {
        if let Ok(mut captured) = captured.try_borrow_mut() {
            captured.push(diagnostic);
        }
    });
}

fn push_xslt_line(line: &str) {
    let line = line.trim();
    if !line.is_empty() {
        push_captured(Diagnostic::new(Severity::Error, line));
    }
}

/// Receives formatted libxslt output, which arrives in arbitrary fragments.
/// Each completed line becomes one diagnostic.
unsafe extern "C" fn xslt_error_sink(fragment: *const c_char) {
    if fragment.is_null() {
        return;
    }
    let fragment = unsafe { CStr::from_ptr(fragment) }.to_string_lossy();

    let _ = PENDING_XSLT.try_with(|pending| {
        if let Ok(mut pending) = pending.try_borrow_mut() {
            pending.push_str(&fragment);
            while let Some(end) = pending.find('\n') {
                let line: String = pending.drain(..=end).collect();
                push_xslt_line(&line);
            }
        }
    });
}

/// Flush a trailing libxslt fragment that never got its newline.
fn flush_pending_xslt() {
    let _ = PENDING_XSLT.try_with(|pending| {
        if let Ok(mut pending) = pending.try_borrow_mut() {
            let rest = std::mem::take(&mut *pending);
            push_xslt_line(&rest);
        }
    });
}

fn clear_pending_xslt() {
    let _ = PENDING_XSLT.try_with(|pending| {
        if let Ok(mut pending) = pending.try_borrow_mut() {
            pending.clear();
        }
    });
}

/// Callback for libxml2 to report parse, validation and XPath errors (structured)
unsafe extern "C" fn structured_error_callback(_user_data: *mut c_void, error: *mut xmlError) {
    if error.is_null() {
        return;
    }
    let error = unsafe { &*error };

    let severity = match error.level {
        XML_ERR_WARNING => Severity::Warning,
        XML_ERR_ERROR => Severity::Error,
        XML_ERR_FATAL => Severity::Fatal,
        _ => return,
    };

    let message = if error.message.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(error.message) }
            .to_string_lossy()
            .trim()
            .to_string()
    };

    let mut diagnostic = Diagnostic::new(severity, message);
    if error.line > 0 {
        diagnostic = diagnostic.at_line(error.line as u32);
    }

    push_captured(diagnostic);
}

/// Routes this thread's libxml2 errors into a buffer for as long as it lives.
struct ErrorCapture {
    // Thread-local state: the guard must stay on the thread that created it
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ErrorCapture {
    fn start() -> Self {
        CAPTURED.with(|captured| captured.borrow_mut().clear());
        clear_pending_xslt();
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), Some(structured_error_callback));
        }
        ErrorCapture {
            _not_send: std::marker::PhantomData,
        }
    }

    fn take(&self) -> Vec<Diagnostic> {
        flush_pending_xslt();
        CAPTURED.with(|captured| std::mem::take(&mut *captured.borrow_mut()))
    }

    /// `"<context>: <diagnostics>"`, or just the context when nothing was reported.
    fn message(&self, context: &str) -> String {
        let diagnostics = self.take();
        if diagnostics.is_empty() {
            context.to_string()
        } else {
            format!("{}: {}", context, render_diagnostics(&diagnostics))
        }
    }
}

impl Drop for ErrorCapture {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), None);
        }
        clear_pending_xslt();
        let _ = CAPTURED.try_with(|captured| {
            if let Ok(mut captured) = captured.try_borrow_mut() {
                captured.clear();
            }
        });
    }
}

/// A parsed document owned by the current call.
struct OwnedDoc(*mut XmlDoc);

impl OwnedDoc {
    fn as_ptr(&self) -> *mut XmlDoc {
        self.0
    }

    /// Give up ownership without freeing.
    fn into_raw(self) -> *mut XmlDoc {
        let ptr = self.0;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for OwnedDoc {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { xmlFreeDoc(self.0) }
        }
    }
}

/// Parse `source` from memory. `None` means libxml2 could not build a tree.
fn read_document(source: &LoadedSource, options: c_int) -> Option<OwnedDoc> {
    let size = c_int::try_from(source.bytes.len()).ok()?;
    let base_uri = source
        .base_uri
        .as_deref()
        .and_then(|uri| CString::new(uri).ok());

    let doc = unsafe {
        xmlReadMemory(
            source.bytes.as_ptr() as *const c_char,
            size,
            base_uri.as_ref().map_or(ptr::null(), |uri| uri.as_ptr()),
            ptr::null(),
            options,
        )
    };

    if doc.is_null() {
        None
    } else {
        Some(OwnedDoc(doc))
    }
}

/// Compiled XSLT stylesheet shared across threads
#[derive(Debug)]
pub struct CompiledStylesheet {
    ptr: *mut XsltStylesheet,
}

// Safety: a compiled stylesheet is only read during transformation; all mutable
// state lives in the per-call xsltTransformContext
unsafe impl Send for CompiledStylesheet {}
unsafe impl Sync for CompiledStylesheet {}

impl Drop for CompiledStylesheet {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xsltFreeStylesheet(self.ptr) }
        }
    }
}

/// Compiled XPath expression shared across threads
#[derive(Debug)]
pub struct CompiledExpression {
    ptr: *mut XmlXPathCompExpr,
}

// Safety: evaluation reads the compiled steps and keeps its state in the per-call
// xmlXPathContext
unsafe impl Send for CompiledExpression {}
unsafe impl Sync for CompiledExpression {}

impl Drop for CompiledExpression {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlXPathFreeCompExpr(self.ptr) }
        }
    }
}

/// [`XmlEngine`] backed by libxml2 and libxslt.
#[derive(Debug, Clone)]
pub struct LibXml2Engine {
    _private: (),
}

impl LibXml2Engine {
    /// Create the engine, initializing libxml2 if not already initialized.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xml_worker_set_error_sink(Some(xslt_error_sink));
            xsltSetGenericErrorFunc(ptr::null_mut(), Some(xml_worker_generic_error));
        });

        LibXml2Engine { _private: () }
    }

    fn compile_expression(&self, expression: &str, context: &str) -> EngineResult<CompiledExpression> {
        let c_expr = CString::new(expression)
            .map_err(|_| EngineError::Compile(format!("{}: expression contains a NUL byte", context)))?;

        let capture = ErrorCapture::start();
        let ptr = unsafe { xmlXPathCompile(c_expr.as_ptr()) };
        if ptr.is_null() {
            return Err(EngineError::Compile(capture.message(context)));
        }

        Ok(CompiledExpression { ptr })
    }

    fn evaluate(
        &self,
        expression: &CompiledExpression,
        document: &LoadedSource,
        params: &Params,
        context: &str,
    ) -> EngineResult<String> {
        let variables = c_params(params)?;

        let capture = ErrorCapture::start();
        let doc = read_document(document, XSLT_PARSE_OPTIONS)
            .ok_or_else(|| EngineError::Eval(capture.message("Failed to parse document")))?;

        unsafe {
            let ctxt = xmlXPathNewContext(doc.as_ptr());
            if ctxt.is_null() {
                return Err(EngineError::Eval(format!(
                    "{}: could not create evaluation context",
                    context
                )));
            }
            xmlXPathSetContextNode(doc.as_ptr() as *mut XmlNode, ctxt);

            for (name, value) in &variables {
                let object = xmlXPathNewCString(value.as_ptr());
                if xmlXPathRegisterVariable(ctxt, name.as_ptr(), object) != 0 {
                    xmlXPathFreeObject(object);
                    xmlXPathFreeContext(ctxt);
                    return Err(EngineError::Eval(format!(
                        "{}: could not bind variable ${}",
                        context,
                        name.to_string_lossy()
                    )));
                }
            }

            let result = xmlXPathCompiledEval(expression.ptr, ctxt);
            xmlXPathFreeContext(ctxt);

            if result.is_null() {
                return Err(EngineError::Eval(capture.message(context)));
            }

            let output = serialize_result(doc.as_ptr(), result);
            xmlXPathFreeObject(result);
            Ok(output)
        }
    }
}

impl Default for LibXml2Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn c_params(params: &Params) -> EngineResult<Vec<(CString, CString)>> {
    params
        .iter()
        .map(|param| {
            let name = CString::new(param.name.as_str());
            let value = CString::new(param.value.as_str());
            match (name, value) {
                (Ok(name), Ok(value)) => Ok((name, value)),
                _ => Err(EngineError::Eval(format!(
                    "Parameter '{}' contains a NUL byte",
                    param.name.replace('\0', "")
                ))),
            }
        })
        .collect()
}

impl XmlEngine for LibXml2Engine {
    type Stylesheet = CompiledStylesheet;
    type Query = CompiledExpression;
    type Path = CompiledExpression;

    fn parse_and_validate(&self, document: &LoadedSource) -> EngineResult<Vec<Diagnostic>> {
        let capture = ErrorCapture::start();

        let Some(doc) = read_document(document, XML_PARSE_DTDLOAD) else {
            let diagnostics = capture.take();
            if diagnostics.is_empty() {
                return Err(EngineError::FatalParse(
                    "document could not be parsed".to_string(),
                ));
            }
            return Ok(diagnostics);
        };

        unsafe {
            if !xmlGetIntSubset(doc.as_ptr()).is_null() {
                let valid_ctxt = xmlNewValidCtxt();
                if valid_ctxt.is_null() {
                    return Err(EngineError::FatalParse(
                        "could not create validation context".to_string(),
                    ));
                }
                xmlValidateDocument(valid_ctxt, doc.as_ptr());
                xmlFreeValidCtxt(valid_ctxt);
            }
        }

        Ok(capture.take())
    }

    fn compile_stylesheet(&self, stylesheet: &LoadedSource) -> EngineResult<CompiledStylesheet> {
        const CONTEXT: &str = "Failed to compile stylesheet";

        let capture = ErrorCapture::start();
        let doc = read_document(stylesheet, XSLT_PARSE_OPTIONS)
            .ok_or_else(|| EngineError::Compile(capture.message(CONTEXT)))?;

        let raw = doc.into_raw();
        let ptr = unsafe { xsltParseStylesheetDoc(raw) };
        if ptr.is_null() {
            // The document still belongs to us when compilation fails
            drop(OwnedDoc(raw));
            return Err(EngineError::Compile(capture.message(CONTEXT)));
        }

        Ok(CompiledStylesheet { ptr })
    }

    fn compile_query(&self, query: &str) -> EngineResult<CompiledExpression> {
        self.compile_expression(query, "Failed to compile query")
    }

    fn compile_path(&self, expression: &str) -> EngineResult<CompiledExpression> {
        self.compile_expression(expression, "Failed to compile XPath expression")
    }

    fn transform(
        &self,
        stylesheet: &CompiledStylesheet,
        document: &LoadedSource,
        params: &Params,
    ) -> EngineResult<String> {
        const CONTEXT: &str = "Failed to run transformation";

        let user_params = c_params(params)?;

        let capture = ErrorCapture::start();
        let doc = read_document(document, XSLT_PARSE_OPTIONS)
            .ok_or_else(|| EngineError::Eval(capture.message("Failed to parse document")))?;

        unsafe {
            let ctxt = xsltNewTransformContext(stylesheet.ptr, doc.as_ptr());
            if ctxt.is_null() {
                return Err(EngineError::Eval(format!(
                    "{}: could not create transform context",
                    CONTEXT
                )));
            }

            for (name, value) in &user_params {
                if xsltQuoteOneUserParam(ctxt, name.as_ptr(), value.as_ptr()) != 0 {
                    xsltFreeTransformContext(ctxt);
                    return Err(EngineError::Eval(format!(
                        "{}: could not bind parameter '{}'",
                        CONTEXT,
                        name.to_string_lossy()
                    )));
                }
            }

            let result = xsltApplyStylesheetUser(
                stylesheet.ptr,
                doc.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
                ctxt,
            );
            xsltFreeTransformContext(ctxt);

            if result.is_null() {
                return Err(EngineError::Eval(capture.message(CONTEXT)));
            }
            let result = OwnedDoc(result);

            let mut buffer: *mut c_char = ptr::null_mut();
            let mut length: c_int = 0;
            if xsltSaveResultToString(&mut buffer, &mut length, result.as_ptr(), stylesheet.ptr) != 0
            {
                return Err(EngineError::Eval(capture.message(
                    "Failed to serialize transformation result",
                )));
            }

            // An empty result leaves the buffer unset
            if buffer.is_null() {
                return Ok(String::new());
            }
            let bytes = std::slice::from_raw_parts(buffer as *const u8, length.max(0) as usize);
            let output = String::from_utf8_lossy(bytes).into_owned();
            libc::free(buffer as *mut c_void);

            Ok(output)
        }
    }

    fn query(
        &self,
        query: &CompiledExpression,
        document: &LoadedSource,
        params: &Params,
    ) -> EngineResult<String> {
        self.evaluate(query, document, params, "Failed to evaluate query")
    }

    fn evaluate_path(
        &self,
        path: &CompiledExpression,
        document: &LoadedSource,
    ) -> EngineResult<String> {
        self.evaluate(
            path,
            document,
            &Params::default(),
            "Failed to evaluate XPath expression",
        )
    }
}

/// Accumulates result items: nodes are concatenated, adjacent atomic values are
/// separated by a single space.
struct SequenceWriter {
    output: String,
    after_atomic: bool,
}

impl SequenceWriter {
    fn new() -> Self {
        Self {
            output: XML_DECLARATION.to_string(),
            after_atomic: false,
        }
    }

    fn atomic(&mut self, value: &str) {
        if self.after_atomic {
            self.output.push(' ');
        }
        self.output.push_str(value);
        self.after_atomic = true;
    }

    fn node(&mut self, markup: &str) {
        self.output.push_str(markup);
        self.after_atomic = false;
    }

    fn finish(self) -> String {
        self.output
    }
}

/// Format a number the way XPath's `string()` does.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e18 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

unsafe fn dump_node(doc: *mut XmlDoc, node: *mut XmlNode) -> String {
    unsafe {
        let buffer = xmlBufferCreate();
        if buffer.is_null() {
            return String::new();
        }
        xmlNodeDump(buffer, doc, node, 0, 0);

        let content = xmlBufferContent(buffer);
        let length = xmlBufferLength(buffer);
        let markup = if content.is_null() || length <= 0 {
            String::new()
        } else {
            let bytes = std::slice::from_raw_parts(content as *const u8, length as usize);
            String::from_utf8_lossy(bytes).into_owned()
        };

        xmlBufferFree(buffer);
        markup
    }
}

unsafe fn write_node(writer: &mut SequenceWriter, doc: *mut XmlDoc, node: *mut XmlNode) {
    if node.is_null() {
        return;
    }
    unsafe {
        match (*node).node_type {
            XML_ATTRIBUTE_NODE => {
                let content = xmlNodeGetContent(node);
                writer.atomic(&c_string(content));
                if !content.is_null() {
                    libc::free(content as *mut c_void);
                }
            }
            XML_NAMESPACE_DECL => {
                let ns = node as *const XmlNs;
                writer.atomic(&c_string((*ns).href));
            }
            XML_DOCUMENT_NODE | XML_HTML_DOCUMENT_NODE => {
                let root = xmlDocGetRootElement(node as *const XmlDoc);
                if !root.is_null() {
                    writer.node(&dump_node(doc, root));
                }
            }
            _ => writer.node(&dump_node(doc, node)),
        }
    }
}

/// Serialize an XPath result as an XML declaration followed by its items.
unsafe fn serialize_result(doc: *mut XmlDoc, object: *const XmlXPathObject) -> String {
    let mut writer = SequenceWriter::new();

    unsafe {
        let object = &*object;
        match object.object_type {
            XPATH_NODESET | XPATH_XSLT_TREE => {
                let set = object.nodesetval;
                if !set.is_null() && !(*set).node_tab.is_null() {
                    for i in 0..(*set).node_nr.max(0) as usize {
                        write_node(&mut writer, doc, *(*set).node_tab.add(i));
                    }
                }
            }
            XPATH_BOOLEAN => writer.atomic(if object.boolval != 0 { "true" } else { "false" }),
            XPATH_NUMBER => writer.atomic(&format_number(object.floatval)),
            XPATH_STRING => writer.atomic(&c_string(object.stringval)),
            _ => {}
        }
    }

    writer.finish()
}
