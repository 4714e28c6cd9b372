//! 阿拉伯文规范化
//!
//! 经文原文和识别结果都先经过这里，得到可比较的规范形式

use std::fmt;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

/// 规范化后的文本
///
/// 只包含规范字母表中的字母和单个 ASCII 空格，首尾无空白。
/// 只能通过 [`normalize`] 构造。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedText(String);

impl NormalizedText {
    /// 规范化任意文本
    pub fn new(raw: &str) -> Self {
        normalize(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 字符数（不是字节数）
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// 按空格切分出的词
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|w| !w.is_empty())
    }

    /// 最后一个词
    ///
    /// 识别器可能一次返回多个词，只取末尾的词与光标处的期望词比较
    pub fn last_word(&self) -> Option<NormalizedText> {
        self.words().last().map(|w| NormalizedText(w.to_string()))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 规范化阿拉伯文
///
/// 处理顺序不能调换：
/// 0. Unicode NFC 组合
/// 1. 去掉元音符号、古兰经注释符号、上标 alef
/// 2. 去掉 tatweel
/// 3. 非阿拉伯字母、非空白的字符替换为空格
/// 4. 字母变体折叠
/// 5. 空白折叠 + 去首尾空白
pub fn normalize(raw: &str) -> NormalizedText {
    if raw.is_empty() {
        return NormalizedText::default();
    }

    let mut result = String::with_capacity(raw.len());
    let mut prev_whitespace = true;

    for ch in raw.nfc() {
        if is_diacritic(ch) || ch == TATWEEL {
            continue;
        }

        let ch = if is_arabic_letter(ch) { fold_variant(ch) } else { ' ' };

        if ch == ' ' {
            if !prev_whitespace {
                result.push(' ');
                prev_whitespace = true;
            }
        } else {
            result.push(ch);
            prev_whitespace = false;
        }
    }

    if result.ends_with(' ') {
        result.pop();
    }

    NormalizedText(result)
}

/// 按分隔符（标点、空白等非字母字符）切分原文，每段保留原始写法
///
/// 每段规范化后最多得到一个词
pub fn split_words(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|ch: char| !(is_arabic_letter(ch) || is_diacritic(ch) || ch == TATWEEL))
        .filter(|part| !part.is_empty())
}

const TATWEEL: char = '\u{0640}';

/// 元音符号及注释符号
fn is_diacritic(ch: char) -> bool {
    matches!(ch,
        '\u{0610}'..='\u{061A}' | // 古兰经注释符号
        '\u{064B}'..='\u{065F}' | // fathatan .. wavy hamza below
        '\u{0670}' |              // 上标 alef
        '\u{06D6}'..='\u{06ED}'   // 小写注释符号、停顿符号
    )
}

/// 阿拉伯字母块中的字母（不含标点、数字、tatweel）
fn is_arabic_letter(ch: char) -> bool {
    matches!(ch,
        '\u{0620}'..='\u{063F}' |
        '\u{0641}'..='\u{064A}' |
        '\u{066E}'..='\u{066F}' |
        '\u{0671}'..='\u{06D3}' |
        '\u{06D5}' |
        '\u{06EE}'..='\u{06EF}' |
        '\u{06FA}'..='\u{06FC}' |
        '\u{06FF}'
    )
}

fn fold_variant(ch: char) -> char {
    match ch {
        // alef 变体：madda / hamza 上 / hamza 下 / wasla
        '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => '\u{0627}',
        // alef maksura
        '\u{0649}' => '\u{064A}',
        // hamza on waw
        '\u{0624}' => '\u{0648}',
        // hamza on ya
        '\u{0626}' => '\u{064A}',
        // ta marbuta
        '\u{0629}' => '\u{0647}',
        // NFC 组合出的带 hamza 字母还原为基字母
        '\u{06C0}' => '\u{06D5}',
        '\u{06C2}' => '\u{06C1}',
        '\u{06D3}' => '\u{06D2}',
        other => other,
    }
}
