//! HTML pages served by the web interface.
//!
//! Pages are assembled with `format!`; everything that came from a user or
//! from Mastodon goes through [`escape`] first.

use crate::ingest::IngestReport;
use crate::models::{Account, AccountSummary, Status};
use crate::predict::Prediction;
use crate::text::plain_text;

/// Escape text for use in element content and quoted attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem;line-height:1.4}\
nav a{margin-right:1rem}form{margin:1rem 0}label{display:block;margin:.4rem 0}\
.status{border-left:3px solid #ccc;padding-left:.8rem;margin:1rem 0;white-space:pre-wrap}\
.error{color:#a00}table{border-collapse:collapse}td,th{padding:.2rem .6rem;text-align:left}";

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} · Mastodoff</title>
<style>{STYLE}</style>
</head>
<body>
<nav><a href="/">Home</a><a href="/about">About</a><a href="/reset">Reset</a></nav>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = escape(title),
    )
}

fn account_link(acct: &str) -> String {
    format!(
        r#"<a href="/get?username={q}">@{text}</a>"#,
        q = escape(&url_component(acct)),
        text = escape(acct)
    )
}

/// Percent-encode for a query-string value.
fn url_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub fn index(accounts: &[AccountSummary]) -> String {
    let options: String = accounts
        .iter()
        .map(|a| format!(r#"<option value="{}">"#, escape(&a.acct)))
        .collect();

    let table = if accounts.is_empty() {
        "<p>No accounts stored yet. Add one above.</p>".to_string()
    } else {
        let rows: String = accounts
            .iter()
            .map(|a| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td><a href=\"{}\">profile</a></td></tr>\n",
                    account_link(&a.acct),
                    a.status_count,
                    escape(&a.url)
                )
            })
            .collect();
        format!(
            "<table>\n<tr><th>Account</th><th>Statuses</th><th></th></tr>\n{}</table>",
            rows
        )
    };

    let body = format!(
        r#"<datalist id="accounts">{options}</datalist>
<h2>Add an account</h2>
<form action="/add" method="post">
<label>Username <input name="username" list="accounts" placeholder="@user@instance" required></label>
<label>Statuses to fetch <input name="count" type="number" min="1" placeholder="all"></label>
<button type="submit">Add</button>
</form>
<h2>Who said it?</h2>
<form action="/predict" method="post">
<label>First account <input name="username1" list="accounts" required></label>
<label>Second account <input name="username2" list="accounts" required></label>
<label>Text <textarea name="content" rows="4" cols="60" required></textarea></label>
<button type="submit">Predict</button>
</form>
<h2>Stored accounts</h2>
{table}"#
    );
    layout("Mastodoff", &body)
}

pub fn about() -> String {
    layout(
        "About",
        "<p>Mastodoff fetches public Mastodon statuses, embeds their text, and \
         trains a logistic regression to guess which of two accounts is more \
         likely to have written a piece of text.</p>",
    )
}

pub fn added(report: &IngestReport) -> String {
    let body = format!(
        "<p>{link} is stored.</p>\n<ul>\n<li>fetched: {fetched}</li>\n<li>new or edited: {stored}</li>\n\
         <li>unchanged: {unchanged}</li>\n<li>without text: {skipped}</li>\n</ul>",
        link = account_link(&report.account.acct),
        fetched = report.fetched,
        stored = report.stored,
        unchanged = report.unchanged,
        skipped = report.skipped,
    );
    layout("Account added", &body)
}

pub fn account(account: &Account, statuses: &[Status]) -> String {
    let items: String = statuses
        .iter()
        .map(|s| {
            format!(
                "<div class=\"status\">{}<br><small><a href=\"{}\">{}</a></small></div>\n",
                escape(&plain_text(&s.content)),
                escape(&s.uri),
                escape(&s.id)
            )
        })
        .collect();

    let body = format!(
        "<p><a href=\"{url}\">{url_text}</a> · id {id} · {n} stored statuses</p>\n{items}",
        url = escape(&account.url),
        url_text = escape(&account.url),
        id = escape(&account.id),
        n = statuses.len(),
    );
    layout(&format!("@{}", account.acct), &body)
}

pub fn prediction(prediction: &Prediction, content: &str) -> String {
    let body = format!(
        "<blockquote class=\"status\">{content}</blockquote>\n\
         <p>This was more likely written by <strong>{winner}</strong> than by {other} \
         (probability {pct:.1}%).</p>\n\
         <p><small>Trained on {n1} and {n2} statuses.</small></p>",
        content = escape(content.trim()),
        winner = account_link(&prediction.account.acct),
        other = account_link(&prediction.other.acct),
        pct = prediction.probability * 100.0,
        n1 = prediction.samples.0,
        n2 = prediction.samples.1,
    );
    layout("Prediction", &body)
}

pub fn reset_confirm() -> String {
    layout(
        "Reset",
        "<p>This deletes every stored account and status.</p>\n\
         <form action=\"/reset\" method=\"post\"><button type=\"submit\">Reset database</button></form>",
    )
}

pub fn reset_done() -> String {
    layout("Reset", "<p>The database has been reset.</p>")
}

pub fn error(message: &str) -> String {
    layout(
        "Something went wrong",
        &format!("<p class=\"error\">{}</p>", escape(message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#39;y&#39;)&lt;/script&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_url_component() {
        assert_eq!(url_component("alice@example.social"), "alice%40example.social");
        assert_eq!(url_component("a b"), "a%20b");
    }

    #[test]
    fn test_error_page_escapes_message() {
        let page = error("No results for <b>bob</b>");
        assert!(page.contains("No results for &lt;b&gt;bob&lt;/b&gt;"));
        assert!(!page.contains("<b>bob</b>"));
    }

    #[test]
    fn test_index_lists_accounts() {
        let accounts = vec![AccountSummary {
            id: "1".into(),
            username: "alice".into(),
            url: "https://example.social/@alice".into(),
            acct: "alice".into(),
            status_count: 12,
            updated_at: 0,
        }];
        let page = index(&accounts);
        assert!(page.contains("/get?username=alice"));
        assert!(page.contains("<td>12</td>"));

        let empty = index(&[]);
        assert!(empty.contains("No accounts stored yet"));
    }
}
