// Server-rendered HTML for the profile and sign-in pages.

/// Data for the public profile page.
pub struct ProfileView {
    pub username: String,
    pub screen_name: String,
    pub avatar_url: Option<String>,
}

/// Render a public profile page.
pub fn render_profile(profile: &ProfileView) -> String {
    let avatar = match &profile.avatar_url {
        Some(url) => format!(
            r#"<img class="avatar" src="{}" alt="avatar">"#,
            html_escape(url)
        ),
        None => r#"<div class="avatar avatar-empty"></div>"#.to_string(),
    };

    let content = format!(
        r#"
<div class="container">
    <div class="profile-card">
        {avatar}
        <h2>{screen_name}</h2>
        <p class="username">@{username}</p>
    </div>
</div>
"#,
        screen_name = html_escape(&profile.screen_name),
        username = html_escape(&profile.username),
    );

    build_page(&profile.screen_name, &content)
}

/// Render the logged-in user's own profile with linked providers.
pub fn render_own_profile(username: &str, providers: &[String]) -> String {
    let mut provider_items = String::new();
    if providers.is_empty() {
        provider_items.push_str(r#"<li class="muted">No linked accounts</li>"#);
    }
    for provider in providers {
        provider_items.push_str(&format!("<li>{}</li>", html_escape(provider)));
    }

    let content = format!(
        r#"
<div class="container">
    <div class="profile-card">
        <h2>{username}</h2>
        <h3>Linked accounts</h3>
        <ul class="providers">{provider_items}</ul>
        <p><a href="/logout">Sign out</a></p>
    </div>
</div>
"#,
        username = html_escape(username),
    );

    build_page("Your profile", &content)
}

/// Render the sign-in page. No server logic; the social-auth pipeline owns
/// the actual login flow.
pub fn render_signin() -> String {
    let content = r#"
<div class="container">
    <div class="profile-card">
        <h2>Sign in</h2>
        <p>Continue with one of your accounts:</p>
        <ul class="providers">
            <li><a href="/login/facebook/">Facebook</a></li>
            <li><a href="/login/twitter/">Twitter</a></li>
            <li><a href="/login/google-oauth2/">Google</a></li>
        </ul>
    </div>
</div>
"#;

    build_page("Sign in", content)
}

fn build_page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} — Localhub</title>
<style>
*{{margin:0;padding:0;box-sizing:border-box;}}
body{{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;color:#1a1a1a;background:#fafafa;}}
.header{{background:#1a1a1a;color:#fff;padding:12px 24px;display:flex;align-items:center;justify-content:space-between;}}
.header h1{{font-size:18px;font-weight:600;}}
.header nav a{{color:#ccc;text-decoration:none;margin-left:20px;font-size:14px;}}
.header nav a:hover{{color:#fff;}}
.container{{max-width:640px;margin:0 auto;padding:24px;}}
.profile-card{{background:#fff;border:1px solid #e0e0e0;border-radius:8px;padding:24px;}}
.profile-card h2{{font-size:20px;margin-bottom:4px;}}
.profile-card h3{{font-size:14px;color:#666;margin:16px 0 6px;}}
.username{{color:#888;font-size:14px;}}
.avatar{{width:96px;height:96px;border-radius:50%;object-fit:cover;margin-bottom:12px;}}
.avatar-empty{{background:#e0e0e0;}}
.providers{{list-style:none;}}
.providers li{{padding:4px 0;font-size:14px;}}
.providers a{{color:#0066cc;text-decoration:none;}}
.muted{{color:#888;}}
</style>
</head>
<body>
<div class="header">
    <h1>Localhub</h1>
    <nav><a href="/">Home</a><a href="/profile">Profile</a></nav>
</div>
{content}
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_user_controlled_values() {
        let view = ProfileView {
            username: "<script>".to_string(),
            screen_name: "a&b".to_string(),
            avatar_url: None,
        };
        let html = render_profile(&view);
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a&amp;b"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn own_profile_lists_providers() {
        let html = render_own_profile("alice", &["facebook".to_string(), "twitter".to_string()]);
        assert!(html.contains("<li>facebook</li>"));
        assert!(html.contains("<li>twitter</li>"));
    }

    #[test]
    fn own_profile_without_providers_says_so() {
        let html = render_own_profile("alice", &[]);
        assert!(html.contains("No linked accounts"));
    }
}
