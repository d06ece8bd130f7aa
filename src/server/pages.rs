use axum::response::Html;

const STYLE: &str = r#"<style>
  body { font-family: system-ui, sans-serif; max-width: 760px; margin: 32px auto; padding: 0 16px; color: #1d1d22; }
  nav a { margin-right: 12px; }
  textarea, input { width: 100%; font-family: ui-monospace, Menlo, monospace; font-size: 13px; padding: 6px; box-sizing: border-box; }
  textarea { min-height: 220px; }
  button { margin-top: 8px; padding: 6px 16px; }
  pre { background: #f4f4f6; padding: 10px; overflow: auto; max-height: 420px; white-space: pre-wrap; }
</style>"#;

const NAV: &str = r#"<nav><a href="/createIntent">Create intents</a><a href="/useModel">Try the model</a><a href="/oauth2callback">Re-authorize</a></nav>"#;

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title>{STYLE}</head>\n<body>{NAV}\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n"
    ))
}

pub fn default_page() -> Html<String> {
    page(
        "Agent bridge",
        "<p>Pick an action above. Creating intents requires an authorized session; you will be sent through the provider sign-in when the stored token has expired.</p>",
    )
}

pub fn create_intent_page() -> Html<String> {
    page(
        "Create intents",
        r#"<p>Intents as JSON: <code>{"id": {"intent": "greet", "training_utterances": ["hi", "hello"]}}</code>. Existing intents on the agent are replaced.</p>
<form id="sync">
  <textarea id="intents">{
  "1": { "intent": "greet", "training_utterances": ["hi", "hello"] }
}</textarea>
  <button type="submit">Replace intents</button>
</form>
<pre id="report"></pre>
<script>
document.getElementById('sync').addEventListener('submit', async (event) => {
  event.preventDefault();
  const out = document.getElementById('report');
  let intents;
  try { intents = JSON.parse(document.getElementById('intents').value); }
  catch (err) { out.textContent = 'invalid JSON: ' + err; return; }
  out.textContent = 'syncing...';
  const resp = await fetch('/api/intents/sync', {
    method: 'POST', headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ intents })
  });
  out.textContent = JSON.stringify(await resp.json(), null, 2);
});
</script>"#,
    )
}

pub fn use_model_page() -> Html<String> {
    page(
        "Try the model",
        r#"<form id="detect">
  <input id="utterance" placeholder="what time is it" required>
  <button type="submit">Detect intent</button>
</form>
<pre id="result"></pre>
<script>
document.getElementById('detect').addEventListener('submit', async (event) => {
  event.preventDefault();
  const utterance = document.getElementById('utterance').value;
  const resp = await fetch('/useModel?utterance=' + encodeURIComponent(utterance));
  document.getElementById('result').textContent = JSON.stringify(await resp.json(), null, 2);
});
</script>"#,
    )
}

pub fn oauth_failed_page(error: &str) -> Html<String> {
    page(
        "Authorization failed",
        &format!(
            "<p>The provider returned: {}</p><p><a href=\"/oauth2callback\">Try again</a></p>",
            escape_html(error)
        ),
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{escape_html, oauth_failed_page};

    #[test]
    fn escapes_provider_error_text() {
        assert_eq!(
            escape_html("<b>\"access_denied\"</b> & 'x'"),
            "&lt;b&gt;&quot;access_denied&quot;&lt;/b&gt; &amp; &#39;x&#39;"
        );
        assert!(oauth_failed_page("<script>").0.contains("&lt;script&gt;"));
    }
}
