use crate::param::STATUS_CODES;

/// 生成错误页和重定向页的简单 HTML
pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let description = match note {
            Some(n) => n,
            None => match STATUS_CODES.get(&code) {
                Some(d) => *d,
                None => {
                    panic!("非法的状态码：{}", code);
                }
            },
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code,
            escape(description)
        );
        Self {
            title,
            css: default_css(),
            body,
        }
    }

    /// 重定向响应附带的说明页，给不会自动跳转的客户端一个可点击的链接
    pub fn redirect(target: &str) -> Self {
        let target = escape(target);
        let body = format!(
            r#"
            <h1>307</h1>
            <p>Temporary Redirect: <a href="{}">{}</a></p>
            "#,
            target, target
        );
        Self {
            title: "307".to_string(),
            css: default_css(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <!-- 本文件由restserver自动生成 -->
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

fn default_css() -> String {
    r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
    .to_string()
}

/// 转义 HTML 特殊字符
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
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
