//! # 重定向解析
//!
//! 在路由匹配之前询问重定向器：请求 URI 是否应当被重定向，以及重定向到哪里。
//! 重定向器构造后不再变化，没有副作用。

use std::collections::HashMap;

use crate::config::Config;

/// 可插拔的重定向查询。
#[cfg_attr(test, mockall::automock)]
pub trait Redirect: Send + Sync {
    /// 请求 URI 是否需要重定向
    fn can_redirect(&self, request_uri: &str) -> bool;

    /// 返回重定向目标。
    ///
    /// # Panics
    ///
    /// 对 `can_redirect` 返回 `false` 的 URI 调用属于编程错误，会直接 panic。
    fn redirect_target(&self, request_uri: &str) -> String;
}

/// 基于内存表的重定向：只处理以 `base` 开头的 URI，并对剩余部分做精确查找。
#[derive(Debug, Clone)]
pub struct SimpleRedirect {
    base: String,
    table: HashMap<String, String>,
}

impl SimpleRedirect {
    pub fn new(base: &str, table: HashMap<String, String>) -> Self {
        Self {
            base: base.to_string(),
            table,
        }
    }

    /// 从配置文件的 `[redirect]` 段构造
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.redirect_base(), config.redirect_table().clone())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn lookup(&self, request_uri: &str) -> Option<&String> {
        request_uri
            .strip_prefix(self.base.as_str())
            .and_then(|sub_path| self.table.get(sub_path))
    }
}

impl Redirect for SimpleRedirect {
    fn can_redirect(&self, request_uri: &str) -> bool {
        self.lookup(request_uri).is_some()
    }

    fn redirect_target(&self, request_uri: &str) -> String {
        match self.lookup(request_uri) {
            Some(target) => target.clone(),
            None => panic!("{} 没有对应的重定向目标", request_uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_base_matches_whole_uri() {
        let redirect = SimpleRedirect::new("", table(&[("/redirectMe", "/redirectTarget")]));
        assert!(redirect.can_redirect("/redirectMe"));
        assert_eq!(redirect.redirect_target("/redirectMe"), "/redirectTarget");
        assert!(!redirect.can_redirect("/redirectMe/child"));
        assert!(!redirect.can_redirect("/other"));
    }

    #[test]
    fn test_base_prefix_is_stripped() {
        let redirect = SimpleRedirect::new("/legacy", table(&[("/a", "http://example.org/a")]));
        assert!(redirect.can_redirect("/legacy/a"));
        assert_eq!(redirect.redirect_target("/legacy/a"), "http://example.org/a");
        // 不以 base 开头的 URI 不会查表
        assert!(!redirect.can_redirect("/a"));
    }

    #[test]
    #[should_panic(expected = "没有对应的重定向目标")]
    fn test_target_without_redirect_panics() {
        let redirect = SimpleRedirect::new("", HashMap::new());
        redirect.redirect_target("/nothing");
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_str(
            r#"
            port = 0
            local = true
            [redirect]
            base = "/old"
            [redirect.table]
            "/x" = "/new/x"
            "#,
        );
        let redirect = SimpleRedirect::from_config(&config);
        assert_eq!(redirect.base(), "/old");
        assert_eq!(redirect.len(), 1);
        assert_eq!(redirect.redirect_target("/old/x"), "/new/x");
    }
}
