//! HTML views.

use axum::response::Html;

const STYLE: &str = r#"<style>
body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 3rem auto; padding: 0 1rem; color: #222; }
#dropZone { border: 2px dashed #999; border-radius: 8px; padding: 3rem; text-align: center; cursor: pointer; }
#dropZone.dragover { border-color: #1a73e8; background: #eef4fd; }
.file-item { display: flex; justify-content: space-between; padding: .25rem 0; }
.remove-file { cursor: pointer; color: #c00; }
button { margin-top: 1rem; padding: .5rem 1.5rem; }
#status { margin-top: 1rem; color: #555; }
</style>"#;

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{} - CloudSync</title>\n{}\n</head>\n<body>\n{}\n</body>\n</html>\n",
        title, STYLE, body
    ))
}

const INDEX_BODY: &str = r#"<h1>CloudSync</h1>
<div id="dropZone">Drop files here or click to choose<input type="file" id="fileInput" multiple hidden></div>
<div id="fileList"></div>
<button id="uploadButton" disabled>Upload</button>
<p id="status"></p>
<script>
document.addEventListener('DOMContentLoaded', () => {
  const dropZone = document.getElementById('dropZone');
  const fileInput = document.getElementById('fileInput');
  const uploadButton = document.getElementById('uploadButton');
  const status = document.getElementById('status');
  const fileList = document.getElementById('fileList');
  let files = [];

  function render() {
    fileList.innerHTML = '';
    files.forEach((file, index) => {
      const item = document.createElement('div');
      item.className = 'file-item';
      const name = document.createElement('span');
      name.textContent = file.name;
      const remove = document.createElement('span');
      remove.className = 'remove-file';
      remove.dataset.index = index;
      remove.textContent = '✕';
      item.append(name, remove);
      fileList.appendChild(item);
    });
    uploadButton.disabled = files.length === 0;
  }

  dropZone.addEventListener('click', () => fileInput.click());
  dropZone.addEventListener('dragover', (e) => { e.preventDefault(); dropZone.classList.add('dragover'); });
  dropZone.addEventListener('dragleave', () => dropZone.classList.remove('dragover'));
  dropZone.addEventListener('drop', (e) => {
    e.preventDefault();
    dropZone.classList.remove('dragover');
    files = [...files, ...e.dataTransfer.files];
    render();
  });
  fileInput.addEventListener('change', () => { files = [...files, ...fileInput.files]; render(); });
  fileList.addEventListener('click', (e) => {
    if (e.target.classList.contains('remove-file')) {
      files.splice(parseInt(e.target.dataset.index), 1);
      render();
    }
  });

  uploadButton.addEventListener('click', async () => {
    const form = new FormData();
    files.forEach((file) => form.append('files', file));
    status.textContent = 'Uploading...';
    uploadButton.disabled = true;
    const response = await fetch('/upload', { method: 'POST', body: form, credentials: 'same-origin' });
    if (response.ok) {
      status.textContent = 'Upload successful. Redirecting to authentication page...';
      window.location.href = '/auth';
    } else {
      status.textContent = 'Upload failed. Please try again.';
      uploadButton.disabled = false;
    }
  });
});
</script>"#;

const AUTH_BODY: &str = r#"<h1>Authorize Google Drive</h1>
<form id="authForm">
  <label for="email">Email address</label>
  <input type="email" id="email" required>
  <button type="submit">Continue</button>
</form>
<p id="status"></p>
<script>
document.addEventListener('DOMContentLoaded', () => {
  const form = document.getElementById('authForm');
  const email = document.getElementById('email');
  const status = document.getElementById('status');
  const button = form.querySelector('button');

  form.addEventListener('submit', async (e) => {
    e.preventDefault();
    status.textContent = 'Authorizing...';
    button.disabled = true;
    const response = await fetch('/authorize', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      credentials: 'same-origin',
      body: JSON.stringify({ email: email.value }),
    });
    const data = await response.json();
    if (!response.ok) {
      status.textContent = `Authorization failed: ${data.message}. Please try again.`;
      button.disabled = false;
    } else if (data.isAuthenticated) {
      window.location.href = '/success';
    } else {
      window.location.href = data.authUrl;
    }
  });
});
</script>"#;

const SUCCESS_BODY: &str = r#"<h1>Upload complete</h1>
<p>Your files were sent to Google Drive.</p>
<p><a href="/">Upload more files</a></p>
<button id="signOut">Sign out</button>
<script>
document.getElementById('signOut').addEventListener('click', async () => {
  await fetch('/signout', { method: 'POST', credentials: 'same-origin' });
  window.location.href = '/';
});
</script>"#;

pub async fn index() -> Html<String> {
    layout("Upload", INDEX_BODY)
}

pub async fn auth() -> Html<String> {
    layout("Authorize", AUTH_BODY)
}

pub async fn success() -> Html<String> {
    layout("Success", SUCCESS_BODY)
}

/// Error view shown when the authorization callback fails.
pub fn error_page(request_id: &str) -> Html<String> {
    layout(
        "Error",
        &format!(
            "<h1 class=\"text-danger\">Error.</h1>\n<h2>An error occurred while processing your request.</h2>\n<p><strong>Request ID:</strong> <code>{}</code></p>\n<p><a href=\"/auth\">Try again</a></p>",
            html_escape::encode_text(request_id)
        ),
    )
}
