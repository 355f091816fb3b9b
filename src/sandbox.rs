//! Page sandbox - evaluates a compiled page module in its own V8 isolate.
//!
//! Every evaluation gets a fresh `JsRuntime`, so pages can't see each
//! other's globals. Pages get V8's built-ins plus:
//! - console.log/info/debug/warn/error (captured, not printed)
//! - `module` / `exports` for node-targeted bundles
//! - No module loader, fs, net or env access
//!
//! A page must evaluate to a string of HTML or a zero-argument function
//! returning one. The value is the script's completion value, falling back
//! to `module.exports` (or its `default`) when that is `undefined`.

use crate::config::SandboxConfig;
use crate::error::PageError;
use crate::ops::{page_runtime, ConsoleOutput};
use deno_core::error::JsError;
use deno_core::{v8, JsRuntime, RuntimeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MB: usize = 1024 * 1024;

/// HTML produced by a page, with what it wrote to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub console: ConsoleOutput,
}

/// What evaluating a page module produced.
pub enum PageOutput {
    Html(RenderedPage),
    Template(PageTemplate),
}

impl PageOutput {
    /// Resolves the output to HTML, calling the template if there is one.
    pub fn render(self) -> Result<RenderedPage, PageError> {
        match self {
            Self::Html(page) => Ok(page),
            Self::Template(template) => template.render(),
        }
    }
}

/// A page that evaluated to a function. Keeps its isolate alive until
/// rendered.
pub struct PageTemplate {
    // Declared before `sandbox` so the handle is released before its isolate.
    function: v8::Global<v8::Function>,
    filename: String,
    sandbox: Sandbox,
}

impl PageTemplate {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Calls the template with no arguments; it must return a string.
    pub fn render(mut self) -> Result<RenderedPage, PageError> {
        let watchdog = Watchdog::arm(&mut self.sandbox.runtime, self.sandbox.config.timeout_ms);

        let outcome = {
            let scope = &mut self.sandbox.runtime.handle_scope();
            let function = v8::Local::new(scope, &self.function);
            let scope = &mut v8::TryCatch::new(scope);
            let receiver: v8::Local<v8::Value> = v8::undefined(scope).into();

            match function.call(scope, receiver, &[]) {
                Some(value) if value.is_string() => Ok(value.to_rust_string_lossy(scope)),
                Some(_) => Err(None),
                None => {
                    let exception = scope.exception();
                    let message = match exception {
                        Some(exception) => exception.to_rust_string_lossy(scope),
                        None => String::from("execution terminated"),
                    };
                    Err(Some(message))
                }
            }
        };

        match outcome {
            Ok(html) => Ok(RenderedPage {
                html,
                console: self.sandbox.console(),
            }),
            Err(None) => Err(PageError::InvalidPageResult {
                filename: self.filename,
            }),
            Err(Some(message)) => {
                let message = self.sandbox.interruption(&watchdog).unwrap_or(message);
                Err(PageError::PageExecutionFailure {
                    filename: self.filename,
                    message,
                })
            }
        }
    }
}

/// Evaluates compiled page source and validates the resulting value.
///
/// The wall-clock timeout is enforced from a tokio task, so it only fires
/// when called inside a multi-threaded tokio runtime.
pub fn execute_page(
    source: &str,
    filename: &str,
    config: &SandboxConfig,
) -> Result<PageOutput, PageError> {
    let mut sandbox = Sandbox::new(config);

    let value = {
        let watchdog = Watchdog::arm(&mut sandbox.runtime, config.timeout_ms);
        let evaluated = sandbox
            .runtime
            .execute_script("<page>", source.to_string())
            .and_then(|value| {
                if sandbox.is_undefined(&value) {
                    sandbox
                        .runtime
                        .execute_script("<page:exports>", "globalThis.__page_exports__()".to_string())
                } else {
                    Ok(value)
                }
            });

        match evaluated {
            Ok(value) => value,
            Err(err) => {
                let message = match sandbox.interruption(&watchdog) {
                    Some(reason) => reason,
                    None => describe_error(&err, source),
                };
                return Err(PageError::PageExecutionFailure {
                    filename: filename.to_string(),
                    message,
                });
            }
        }
    };

    match Shape::of(&mut sandbox.runtime, &value) {
        Shape::Html(html) => Ok(PageOutput::Html(RenderedPage {
            html,
            console: sandbox.console(),
        })),
        Shape::Function(function) => Ok(PageOutput::Template(PageTemplate {
            sandbox,
            function,
            filename: filename.to_string(),
        })),
        Shape::Other => Err(PageError::InvalidPageResult {
            filename: filename.to_string(),
        }),
    }
}

/// The accepted shapes of a page value.
enum Shape {
    Html(String),
    Function(v8::Global<v8::Function>),
    Other,
}

impl Shape {
    fn of(runtime: &mut JsRuntime, value: &v8::Global<v8::Value>) -> Self {
        let scope = &mut runtime.handle_scope();
        let local = v8::Local::new(scope, value);

        if local.is_string() {
            return Self::Html(local.to_rust_string_lossy(scope));
        }
        match v8::Local::<v8::Function>::try_from(local) {
            Ok(function) => Self::Function(v8::Global::new(scope, function)),
            Err(_) => Self::Other,
        }
    }
}

/// Error text for a failed evaluation. Syntax errors also get a
/// line-numbered dump of the source.
fn describe_error(err: &anyhow::Error, source: &str) -> String {
    let is_syntax_error = err
        .downcast_ref::<JsError>()
        .and_then(|js| js.name.as_deref())
        == Some("SyntaxError");

    if !is_syntax_error {
        return err.to_string();
    }

    format!("{}\n\n\n{}", err, numbered_source(source))
}

fn numbered_source(source: &str) -> String {
    source
        .split('\n')
        .enumerate()
        .map(|(i, row)| format!("{}  - {}", i + 1, row))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Runtime
// ============================================================================

struct Sandbox {
    runtime: JsRuntime,
    config: SandboxConfig,
    heap_exhausted: Arc<AtomicBool>,
}

impl Sandbox {
    fn new(config: &SandboxConfig) -> Self {
        // Configure V8 heap limits if specified
        let create_params = config
            .max_heap_size
            .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![page_runtime::init_ops_and_esm()],
            create_params,
            ..Default::default()
        });

        let heap_exhausted = Arc::new(AtomicBool::new(false));
        if config.max_heap_size.is_some() {
            let isolate = runtime.v8_isolate().thread_safe_handle();
            let exhausted = heap_exhausted.clone();
            runtime.add_near_heap_limit_callback(move |current, initial| {
                tracing::warn!(
                    current_mb = current / MB,
                    initial_mb = initial / MB,
                    "page sandbox near heap limit, terminating"
                );
                exhausted.store(true, Ordering::SeqCst);
                isolate.terminate_execution();
                // Room for the termination to unwind instead of aborting the process.
                current * 2
            });
        }

        runtime.op_state().borrow_mut().put(ConsoleOutput::default());

        Self {
            runtime,
            config: config.clone(),
            heap_exhausted,
        }
    }

    fn is_undefined(&mut self, value: &v8::Global<v8::Value>) -> bool {
        let scope = &mut self.runtime.handle_scope();
        v8::Local::new(scope, value).is_undefined()
    }

    fn console(&mut self) -> ConsoleOutput {
        let state = self.runtime.op_state();
        let console = state.borrow().try_borrow::<ConsoleOutput>().cloned();
        console.unwrap_or_default()
    }

    /// Why the isolate was terminated, if it was.
    fn interruption(&self, watchdog: &Watchdog) -> Option<String> {
        if watchdog.timed_out() {
            let ms = self.config.timeout_ms.unwrap_or_default();
            return Some(format!("execution timed out after {ms}ms"));
        }
        if self.heap_exhausted.load(Ordering::SeqCst) {
            let max = self.config.max_heap_size.unwrap_or_default();
            return Some(format!("heap limit of {}MB exceeded", max / MB));
        }
        None
    }
}

/// Terminates the isolate once the wall-clock budget is spent. Disarmed on
/// drop.
struct Watchdog {
    task: Option<tokio::task::JoinHandle<()>>,
    timed_out: Arc<AtomicBool>,
}

impl Watchdog {
    fn arm(runtime: &mut JsRuntime, timeout_ms: Option<u64>) -> Self {
        let timed_out = Arc::new(AtomicBool::new(false));

        let task = timeout_ms.and_then(|ms| {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::debug!("no tokio runtime, page timeout disabled");
                return None;
            };
            let isolate = runtime.v8_isolate().thread_safe_handle();
            let fired = timed_out.clone();
            Some(handle.spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                fired.store(true, Ordering::SeqCst);
                isolate.terminate_execution();
            }))
        });

        Self { task, timed_out }
    }

    fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
