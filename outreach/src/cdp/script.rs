//! In-page helper evaluated through `Runtime.evaluate`.
//!
//! The helper lives on the top-level window and reaches same-origin frames
//! through `document.querySelectorAll('iframe,frame')`, so a frame scope is
//! just an index into that list. Found elements are kept in a ref array and
//! addressed by index afterwards; navigation wipes the array, which surfaces
//! as a detached element.

use serde_json::json;

use crate::engine::Scope;
use crate::errors::AutomationError;
use crate::locator::Locator;

const HELPER: &str = r#"(() => {
  if (window.__outreach) return;
  const root = { refs: [] };
  root.doc = (frame) => {
    if (frame === null) return document;
    const host = document.querySelectorAll('iframe,frame')[frame];
    if (!host) throw new Error('context closed: frame ' + frame + ' is gone');
    let doc = null;
    try { doc = host.contentDocument; } catch (e) { doc = null; }
    if (!doc) throw new Error('context closed: frame ' + frame + ' is not accessible');
    return doc;
  };
  root.visible = (el) => {
    const rect = el.getBoundingClientRect();
    const style = el.ownerDocument.defaultView.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
  };
  root.label = (el) => (el.innerText || el.textContent || el.value || el.getAttribute('aria-label') || '').trim();
  root.matches = (doc, loc) => {
    switch (loc.kind) {
      case 'css':
        return Array.from(doc.querySelectorAll(loc.selector));
      case 'xPath': {
        const snap = doc.evaluate(loc.expression, doc, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const out = [];
        for (let i = 0; i < snap.snapshotLength; i++) out.push(snap.snapshotItem(i));
        return out;
      }
      case 'text': {
        const tags = loc.tags || 'button,a,[role=button],label,span,div';
        const needle = loc.text.toLowerCase();
        return Array.from(doc.querySelectorAll(tags)).filter((el) => {
          const text = root.label(el).toLowerCase();
          return loc.exact ? text === needle : text.includes(needle);
        });
      }
      case 'role': {
        const implicit = { button: 'button', link: 'a[href]', textbox: 'input,textarea', checkbox: 'input[type=checkbox]', radio: 'input[type=radio]' };
        const selector = '[role="' + CSS.escape(loc.role) + '"]' + (implicit[loc.role] ? ',' + implicit[loc.role] : '');
        const name = loc.name ? loc.name.toLowerCase() : null;
        return Array.from(doc.querySelectorAll(selector)).filter((el) => !name || root.label(el).toLowerCase().includes(name));
      }
      case 'attribute':
        return Array.from(doc.querySelectorAll('[' + CSS.escape(loc.name) + '="' + CSS.escape(loc.value) + '"]'));
      default:
        throw new Error('invalid locator: ' + loc.kind);
    }
  };
  root.first = (frame, loc) => root.matches(root.doc(frame), loc).find(root.visible) || null;
  root.exists = (frame, loc) => root.first(frame, loc) !== null;
  root.find = (frame, loc) => {
    const el = root.first(frame, loc);
    if (!el) return null;
    root.refs.push(el);
    return root.refs.length - 1;
  };
  root.el = (handle) => {
    const el = root.refs[handle];
    if (!el || !el.isConnected) throw new Error('element detached: ref ' + handle);
    return el;
  };
  root.click = (handle) => {
    const el = root.el(handle);
    el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
  };
  root.fill = (handle, value) => {
    const el = root.el(handle);
    el.focus();
    const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
    if (desc && desc.set) desc.set.call(el, value);
    else if (el.isContentEditable) el.textContent = value;
    else el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
  };
  root.text = (handle) => root.label(root.el(handle));
  root.disabled = (handle) => {
    const el = root.el(handle);
    return !!(el.disabled || el.getAttribute('aria-disabled') === 'true');
  };
  root.frames = () => Array.from(document.querySelectorAll('iframe,frame')).map((host) => {
    try { return !!host.contentDocument; } catch (e) { return false; }
  });
  root.pageText = (frame) => {
    const body = root.doc(frame).body;
    return body ? (body.innerText || body.textContent || '') : '';
  };
  window.__outreach = root;
})()"#;

/// Expression that installs the helper if needed, then runs `call` against it.
fn with_helper(call: &str) -> String {
    format!("{HELPER};\nwindow.__outreach.{call}")
}

fn frame_arg(scope: &Scope) -> String {
    match scope.frame {
        Some(index) => index.to_string(),
        None => "null".to_string(),
    }
}

fn locator_arg(locator: &Locator) -> Result<String, AutomationError> {
    if !locator.is_valid() {
        return Err(AutomationError::InvalidLocator(locator.to_string()));
    }
    serde_json::to_string(locator).map_err(|e| AutomationError::Internal(format!("locator encode: {e}")))
}

pub fn find(scope: &Scope, locator: &Locator) -> Result<String, AutomationError> {
    Ok(with_helper(&format!("find({}, {})", frame_arg(scope), locator_arg(locator)?)))
}

pub fn exists(scope: &Scope, locator: &Locator) -> Result<String, AutomationError> {
    Ok(with_helper(&format!("exists({}, {})", frame_arg(scope), locator_arg(locator)?)))
}

pub fn click(handle: &str) -> String {
    with_helper(&format!("click({})", json!(handle_index(handle))))
}

pub fn fill(handle: &str, value: &str) -> String {
    with_helper(&format!("fill({}, {})", json!(handle_index(handle)), json!(value)))
}

pub fn element_text(handle: &str) -> String {
    with_helper(&format!("text({})", json!(handle_index(handle))))
}

pub fn is_disabled(handle: &str) -> String {
    with_helper(&format!("disabled({})", json!(handle_index(handle))))
}

pub fn frames() -> String {
    with_helper("frames()")
}

pub fn page_text(scope: &Scope) -> String {
    with_helper(&format!("pageText({})", frame_arg(scope)))
}

/// Handles are ref indexes; anything unparseable maps to a ref that never exists.
fn handle_index(handle: &str) -> i64 {
    handle.parse().unwrap_or(-1)
}

/// Classify an exception message thrown by the helper.
pub fn classify_exception(message: &str) -> AutomationError {
    if message.contains("context closed") {
        AutomationError::ContextClosed(message.to_string())
    } else if message.contains("element detached") {
        AutomationError::ElementDetached(message.to_string())
    } else if message.contains("invalid locator") || message.contains("is not a valid selector") {
        AutomationError::InvalidLocator(message.to_string())
    } else {
        AutomationError::Protocol(message.to_string())
    }
}
