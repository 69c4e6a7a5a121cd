//! services/desktop/src/web/pages.rs
//!
//! The relay pages served at the provider's redirect URI. The browser never
//! sends the URL fragment to the server, so the page script reads it and
//! hands it to the app through the custom scheme.

/// Which relay strategies the page script tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Fragment relay only (`/`).
    Fragment,
    /// Code POST first, fragment relay otherwise (`/callback`).
    CodeOrFragment,
}

const STYLE: &str = r#"
      body { font-family: Arial, sans-serif; text-align: center; padding-top: 50px; background-color: #f5f5f5; }
      .container { background-color: white; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); padding: 20px; max-width: 500px; margin: 0 auto; }
      h2 { color: #4a6da7; }
      .spinner { margin: 20px auto; border: 4px solid rgba(0,0,0,0.1); width: 36px; height: 36px; border-radius: 50%; border-left-color: #4a6da7; animation: spin 1s linear infinite; }
      @keyframes spin { 0% { transform: rotate(0deg); } 100% { transform: rotate(360deg); } }
"#;

/// Renders the relay page for `scheme`. Config loading restricts the scheme
/// to ASCII alphanumerics and `+-.`, so it embeds into the script as is.
pub fn relay_page(scheme: &str, mode: RelayMode) -> String {
    let fragment_relay = format!(
        r#"function relayFragment() {{
        const hash = window.location.hash.substring(1);
        if (hash && hash.includes('access_token')) {{
          window.location.href = '{scheme}://login-callback#' + hash;
          setStatus('Login received. Returning to MemoWave...');
          setTimeout(() => window.close(), 3000);
          return true;
        }}
        return false;
      }}"#
    );

    let entry = match mode {
        RelayMode::Fragment => "relayFragment();".to_string(),
        RelayMode::CodeOrFragment => r#"const code = new URLSearchParams(window.location.search).get('code');
      if (code) {
        fetch('/handle-auth-code', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ code })
        })
          .then(response => response.json())
          .then(data => {
            if (data.success) {
              setStatus('Login successful. Returning to MemoWave...');
              setTimeout(() => window.close(), 2000);
            } else {
              setStatus('Login failed: ' + data.error);
            }
          })
          .catch(() => setStatus('Could not reach MemoWave.'));
      } else if (!relayFragment()) {
        setStatus('No login information was found.');
      }"#
            .to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>MemoWave Login</title>
    <style>{STYLE}</style>
  </head>
  <body>
    <div class="container">
      <h2>MemoWave Login</h2>
      <p id="status">Processing login...</p>
      <div class="spinner"></div>
    </div>
    <script>
      function setStatus(text) {{
        document.getElementById('status').textContent = text;
      }}
      {fragment_relay}
      {entry}
    </script>
  </body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_page_relays_into_the_scheme() {
        let page = relay_page("memowave", RelayMode::Fragment);
        assert!(page.contains("'memowave://login-callback#' + hash"));
        assert!(!page.contains("/handle-auth-code"));
    }

    #[test]
    fn callback_page_posts_codes() {
        let page = relay_page("memowave-dev", RelayMode::CodeOrFragment);
        assert!(page.contains("fetch('/handle-auth-code'"));
        assert!(page.contains("'memowave-dev://login-callback#' + hash"));
    }
}
