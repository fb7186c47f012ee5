//! Embedding the serialized context in page markup and getting it back out

use tracing::warn;

use super::{serialize_context, ResumableContext};

/// Well-known id of the embedded payload block
pub const STATE_BLOCK_ID: &str = "__RESUMABLE_STATE__";

const BODY_CLOSE: &str = "</body>";

/// Minimal client bootstrap: parses the payload block, exposes the state
/// table and a per-(symbol, chunk) resolve cache, installs one delegated
/// listener per referenced event type, and flips the lifecycle flags. A
/// wasm runtime performing the same steps natively can ignore it.
const BOOTSTRAP_SCRIPT: &str = r#"<script>
(function () {
  var block = document.getElementById('__RESUMABLE_STATE__');
  if (!block) return;
  var rt = window.__RESUMABLE__ = window.__RESUMABLE__ || {};
  if (rt.resumed) return;
  rt.resuming = true;
  var snapshot;
  try {
    snapshot = JSON.parse(block.textContent);
  } catch (err) {
    console.warn('resumable: malformed payload, starting fresh', err);
    rt.state = {};
    rt.resuming = false;
    rt.resumed = true;
    return;
  }
  rt.state = {};
  (snapshot.state || []).forEach(function (pair) { rt.state[pair[0]] = pair[1]; });
  var refs = {};
  (snapshot.lazyReferences || []).forEach(function (r) { refs[r.symbol] = r; });
  var importMap = snapshot.importMap || {};
  var chunks = {};
  var resolved = {};
  rt.resolve = function (symbol) {
    var ref = refs[symbol];
    if (!ref) return Promise.reject(new Error('unknown reference: ' + symbol));
    if (ref.chunk === 'inline') {
      return Promise.reject(new Error('inline reference ' + symbol + ' must be re-registered before it can be invoked'));
    }
    var key = symbol + ':' + ref.chunk;
    if (resolved[key]) return resolved[key];
    if (!chunks[ref.chunk]) chunks[ref.chunk] = import(importMap[ref.chunk] || ref.chunk);
    resolved[key] = chunks[ref.chunk].then(function (module) { return module[ref.exportName]; });
    return resolved[key];
  };
  var events = {};
  (snapshot.listeners || []).forEach(function (l) { events[l.event] = true; });
  Object.keys(refs).forEach(function (s) { if (refs[s].event) events[refs[s].event] = true; });
  Object.keys(events).forEach(function (type) {
    document.addEventListener(type, function (ev) {
      var el = ev.target;
      while (el && el !== document.body) {
        var symbol = el.getAttribute && el.getAttribute('data-qrl-' + type);
        if (symbol) {
          rt.resolve(symbol).then(function (fn) {
            if (fn) fn(ev, (refs[symbol] || {}).capturedState);
          }).catch(function (err) {
            console.warn('resumable: handler failed', err);
          });
          return;
        }
        el = el.parentElement;
      }
    }, true);
  });
  rt.resuming = false;
  rt.resumed = true;
})();
</script>"#;

/// Place the payload block and bootstrap script immediately before the
/// closing body tag. When the marker is absent (streaming or fragment
/// responses) both are appended at the end of the document instead of being
/// dropped.
pub fn inject_into_page(
    html: &str,
    context: &ResumableContext,
) -> Result<String, serde_json::Error> {
    let payload = escape_for_script(&serialize_context(context)?);
    let mut block = format!(
        "<script type=\"application/json\" id=\"{STATE_BLOCK_ID}\">{payload}</script>\n"
    );
    block.push_str(BOOTSTRAP_SCRIPT);

    match find_body_close(html) {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(&html[..idx]);
            out.push_str(&block);
            out.push_str(&html[idx..]);
            Ok(out)
        }
        None => {
            warn!("page has no closing body tag; appending resumable payload at the end");
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(html);
            out.push_str(&block);
            Ok(out)
        }
    }
}

/// Locate the embedded payload block by its well-known id and return the
/// serialized context text
pub fn extract_from_page(html: &str) -> Option<String> {
    let id_marker = format!("id=\"{STATE_BLOCK_ID}\"");
    let id_at = html.find(&id_marker)?;
    let content_start = id_at + html[id_at..].find('>')? + 1;
    let content_len = html[content_start..].find("</script>")?;
    Some(unescape_from_script(
        &html[content_start..content_start + content_len],
    ))
}

fn find_body_close(html: &str) -> Option<usize> {
    html.to_ascii_lowercase().find(BODY_CLOSE)
}

/// A literal `</script>` inside a JSON string would terminate the embedding
/// block early; `<\/` is the equivalent JSON escape.
fn escape_for_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

fn unescape_from_script(json: &str) -> String {
    json.replace("<\\/", "</")
}
