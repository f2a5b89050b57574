//! Content rewriting for path-prefixed tunnels
//!
//! Visitors see a tunnelled app under `/t/<slug>/`, but the app emits
//! HTML, JS and CSS assuming a root mount. Root-absolute URLs in
//! response bodies are rewritten to carry the tunnel prefix, and HTML
//! gets a runtime shim so URLs built dynamically by the app are fixed
//! up in the browser as well.
//!
//! All passes operate on whole UTF-8 buffers with linear regex scans;
//! non-UTF-8 bodies pass through untouched. Every pass is idempotent:
//! already-prefixed URLs are left alone and the shim is injected at
//! most once.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Content categories the rewriter handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteKind {
    Html,
    Script,
    Stylesheet,
}

/// Classify a Content-Type header value by substring match
pub fn rewrite_kind(content_type: &str) -> Option<RewriteKind> {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("text/html") {
        Some(RewriteKind::Html)
    } else if ct.contains("javascript") || ct.contains("typescript") {
        Some(RewriteKind::Script)
    } else if ct.contains("text/css") {
        Some(RewriteKind::Stylesheet)
    } else {
        None
    }
}

/// Rewrite a response body for the given slug.
///
/// Returns `None` when the content type is not rewritable or the body
/// is not valid UTF-8; the caller then passes the body through
/// untouched. `Some` bodies need a recomputed `Content-Length`.
pub fn rewrite_body(body: &[u8], content_type: &str, slug: &str) -> Option<String> {
    let kind = rewrite_kind(content_type)?;
    let text = std::str::from_utf8(body).ok()?;
    let prefix = format!("/t/{slug}");

    Some(match kind {
        RewriteKind::Html => rewrite_html(text, &prefix),
        RewriteKind::Script => rewrite_script(text, &prefix),
        RewriteKind::Stylesheet => rewrite_stylesheet(text, &prefix),
    })
}

/// A URL is rewritten only if it is root-absolute (exactly one leading
/// slash; `//` is protocol-relative) and not already under the prefix.
fn should_rewrite(path: &str, prefix: &str) -> bool {
    if !path.starts_with('/') || path.starts_with("//") {
        return false;
    }
    path != prefix && !path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

// URL-bearing HTML attributes, longest names first so the alternation
// consumes "data-src"/"srcset" before "src"
static HTML_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(data-src|srcset|src|href|action|content)="(/[^"]*)""#).unwrap()
});

static MODULE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)(<script[^>]*type="module"[^>]*>)(.*?)(</script>)"#).unwrap());

static HEAD_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head[^>]*>").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html[^>]*>").unwrap());

// ES module specifiers and runtime URL call sites
static JS_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\bfrom\s*)(["'])(/[^"']*)["']"#).unwrap());
static JS_IMPORT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\bimport\s*)(["'])(/[^"']*)["']"#).unwrap());
static JS_IMPORT_DYN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\bimport\(\s*)(["'])(/[^"']*)["']"#).unwrap());
static JS_FETCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\bfetch\(\s*)(["'])(/[^"']*)["']"#).unwrap());
static JS_NEW_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\bnew\s+URL\(\s*)(["'])(/[^"']*)["']"#).unwrap());
static JS_SOURCEMAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(//[#@]\s*sourceMappingURL=)(/\S+)").unwrap());

// CSS url() in its three quote styles, plus @import
static CSS_URL_SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"url\('(/[^']+)'\)").unwrap());
static CSS_URL_DOUBLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\("(/[^"]+)"\)"#).unwrap());
static CSS_URL_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\((/[^)'"]+)\)"#).unwrap());
static CSS_IMPORT_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@import\s+'(/[^']+)'").unwrap());
static CSS_IMPORT_DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@import\s+"(/[^"]+)""#).unwrap());

fn rewrite_html(html: &str, prefix: &str) -> String {
    let pass = HTML_ATTR.replace_all(html, |caps: &Captures| {
        let (attr, path) = (&caps[1], &caps[2]);
        if should_rewrite(path, prefix) {
            format!(r#"{attr}="{prefix}{path}""#)
        } else {
            caps[0].to_string()
        }
    });

    // url() occurrences in inline style attributes and <style> blocks
    let pass = rewrite_css_urls(&pass, prefix);

    let pass = MODULE_SCRIPT.replace_all(&pass, |caps: &Captures| {
        format!(
            "{}{}{}",
            &caps[1],
            rewrite_module_specifiers(&caps[2], prefix),
            &caps[3]
        )
    });

    inject_shim(&pass, prefix)
}

/// Static imports, side-effect imports and dynamic `import()`
fn rewrite_module_specifiers(source: &str, prefix: &str) -> String {
    let quoted = |caps: &Captures| {
        let (lead, quote, path) = (&caps[1], &caps[2], &caps[3]);
        if should_rewrite(path, prefix) {
            format!("{lead}{quote}{prefix}{path}{quote}")
        } else {
            caps[0].to_string()
        }
    };

    let pass = JS_FROM.replace_all(source, quoted);
    let pass = JS_IMPORT_DYN.replace_all(&pass, quoted);
    let pass = JS_IMPORT_BARE.replace_all(&pass, quoted);
    pass.into_owned()
}

fn rewrite_script(source: &str, prefix: &str) -> String {
    let quoted = |caps: &Captures| {
        let (lead, quote, path) = (&caps[1], &caps[2], &caps[3]);
        if should_rewrite(path, prefix) {
            format!("{lead}{quote}{prefix}{path}{quote}")
        } else {
            caps[0].to_string()
        }
    };

    let pass = rewrite_module_specifiers(source, prefix);
    let pass = JS_FETCH.replace_all(&pass, quoted);
    let pass = JS_NEW_URL.replace_all(&pass, quoted);
    let pass = JS_SOURCEMAP.replace_all(&pass, |caps: &Captures| {
        let (lead, path) = (&caps[1], &caps[2]);
        if should_rewrite(path, prefix) {
            format!("{lead}{prefix}{path}")
        } else {
            caps[0].to_string()
        }
    });
    pass.into_owned()
}

fn rewrite_stylesheet(css: &str, prefix: &str) -> String {
    let pass = rewrite_css_urls(css, prefix);

    let single = CSS_IMPORT_SINGLE.replace_all(&pass, |caps: &Captures| {
        let path = &caps[1];
        if should_rewrite(path, prefix) {
            format!("@import '{prefix}{path}'")
        } else {
            caps[0].to_string()
        }
    });
    let double = CSS_IMPORT_DOUBLE.replace_all(&single, |caps: &Captures| {
        let path = &caps[1];
        if should_rewrite(path, prefix) {
            format!(r#"@import "{prefix}{path}""#)
        } else {
            caps[0].to_string()
        }
    });
    double.into_owned()
}

fn rewrite_css_urls(body: &str, prefix: &str) -> String {
    let pass = CSS_URL_SINGLE.replace_all(body, |caps: &Captures| {
        let path = &caps[1];
        if should_rewrite(path, prefix) {
            format!("url('{prefix}{path}')")
        } else {
            caps[0].to_string()
        }
    });
    let pass = CSS_URL_DOUBLE.replace_all(&pass, |caps: &Captures| {
        let path = &caps[1];
        if should_rewrite(path, prefix) {
            format!(r#"url("{prefix}{path}")"#)
        } else {
            caps[0].to_string()
        }
    });
    let pass = CSS_URL_BARE.replace_all(&pass, |caps: &Captures| {
        let path = caps[1].trim();
        if should_rewrite(path, prefix) {
            format!("url({prefix}{path})")
        } else {
            caps[0].to_string()
        }
    });
    pass.into_owned()
}

/// Global flag the shim sets; also the marker that keeps injection
/// idempotent across repeated rewrites
const SHIM_GUARD: &str = "__portholeShimInstalled";

/// Insert the runtime shim as the first child of `<head>`, synthesising
/// the element when the document has none
fn inject_shim(html: &str, prefix: &str) -> String {
    if html.contains(SHIM_GUARD) {
        return html.to_string();
    }

    let shim = SHIM_TEMPLATE.replace("__PORTHOLE_PREFIX__", prefix);

    if let Some(head) = HEAD_TAG.find(html) {
        let mut out = html.to_string();
        out.insert_str(head.end(), &shim);
        return out;
    }
    if let Some(open) = HTML_TAG.find(html) {
        let mut out = html.to_string();
        out.insert_str(open.end(), &format!("<head>{shim}</head>"));
        return out;
    }
    format!("{shim}{html}")
}

/// Patches browser URL entry points so the app's dynamically built
/// requests stay under the tunnel prefix. WebSocket construction gets a
/// CLOSED dummy on failure so dev-server reload clients stay quiet.
const SHIM_TEMPLATE: &str = r#"<script>
(function () {
  if (window.__portholeShimInstalled) return;
  window.__portholeShimInstalled = true;
  var prefix = "__PORTHOLE_PREFIX__";
  function rw(url) {
    if (typeof url !== "string") return url;
    if (url.charAt(0) !== "/" || url.charAt(1) === "/") return url;
    if (url === prefix || url.indexOf(prefix + "/") === 0) return url;
    return prefix + url;
  }
  var baseFetch = window.fetch;
  if (baseFetch) {
    window.fetch = function (input, init) {
      if (typeof input === "string") {
        input = rw(input);
      } else if (input && typeof Request !== "undefined" && input instanceof Request) {
        input = new Request(rw(input.url), input);
      }
      return baseFetch.call(this, input, init);
    };
  }
  var baseOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, url) {
    var args = Array.prototype.slice.call(arguments);
    args[1] = rw(url);
    return baseOpen.apply(this, args);
  };
  ["pushState", "replaceState"].forEach(function (name) {
    var base = history[name];
    history[name] = function (state, title, url) {
      return base.call(this, state, title, typeof url === "string" ? rw(url) : url);
    };
  });
  [
    [window.HTMLImageElement, "src"],
    [window.HTMLScriptElement, "src"],
    [window.HTMLLinkElement, "href"]
  ].forEach(function (entry) {
    var ctor = entry[0];
    var name = entry[1];
    if (!ctor) return;
    var desc = Object.getOwnPropertyDescriptor(ctor.prototype, name);
    if (!desc || !desc.set) return;
    Object.defineProperty(ctor.prototype, name, {
      get: desc.get,
      set: function (value) { desc.set.call(this, rw(value)); },
      configurable: true
    });
  });
  var BaseWebSocket = window.WebSocket;
  if (BaseWebSocket) {
    var PatchedWebSocket = function (url, protocols) {
      if (typeof url === "string" && url.charAt(0) === "/" && url.charAt(1) !== "/") {
        var scheme = window.location.protocol === "https:" ? "wss://" : "ws://";
        url = scheme + window.location.host + rw(url);
      }
      try {
        return protocols === undefined ? new BaseWebSocket(url) : new BaseWebSocket(url, protocols);
      } catch (err) {
        return {
          readyState: 3,
          send: function () {},
          close: function () {},
          addEventListener: function () {},
          removeEventListener: function () {},
          onopen: null,
          onmessage: null,
          onerror: null,
          onclose: null
        };
      }
    };
    PatchedWebSocket.prototype = BaseWebSocket.prototype;
    PatchedWebSocket.CONNECTING = 0;
    PatchedWebSocket.OPEN = 1;
    PatchedWebSocket.CLOSING = 2;
    PatchedWebSocket.CLOSED = 3;
    window.WebSocket = PatchedWebSocket;
  }
  var BaseEventSource = window.EventSource;
  if (BaseEventSource) {
    var PatchedEventSource = function (url, config) {
      return new BaseEventSource(rw(url), config);
    };
    PatchedEventSource.prototype = BaseEventSource.prototype;
    window.EventSource = PatchedEventSource;
  }
})();
</script>"#;
