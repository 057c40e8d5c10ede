// ==========================================
// 单车道客运站 - 提示文本（rust-i18n）
// ==========================================
// 语言: en（默认回退）/ zh-CN，启动时由 TERMINAL_LANE_LOCALE 选择
// 文本: locales/*.yml，占位符写作 %{name}
// 注意: rust_i18n::i18n! 宏在 lib.rs 中初始化，locale 为进程级全局状态
// ==========================================

/// 已提供文本的语言
pub const SUPPORTED_LOCALES: [&str; 2] = ["en", "zh-CN"];

/// 启动时读取的语言环境变量
pub const LOCALE_ENV: &str = "TERMINAL_LANE_LOCALE";

/// 切换语言；不支持的语言保持当前设置并返回 false
pub fn set_locale(locale: &str) -> bool {
    match SUPPORTED_LOCALES.iter().find(|l| l.eq_ignore_ascii_case(locale.trim())) {
        Some(supported) => {
            rust_i18n::set_locale(supported);
            true
        }
        None => false,
    }
}

/// 按环境变量选择语言，返回生效的语言
pub fn init_from_env() -> String {
    if let Ok(requested) = std::env::var(LOCALE_ENV) {
        if !set_locale(&requested) {
            tracing::warn!(locale = %requested, "不支持的提示语言，使用默认语言");
        }
    }
    rust_i18n::locale().to_string()
}

pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译并替换 %{name} 占位符
///
/// ```no_run
/// use terminal_lane::i18n::t_with_args;
/// let msg = t_with_args("lane.penalty_blocked", &[("plate", "ABC-123")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    args.iter().fold(t(key), |text, (name, value)| {
        text.replace(&format!("%{{{}}}", name), value)
    })
}
