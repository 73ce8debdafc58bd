//! Terminal rendering of query results

use konkyo_common::QueryResult;
use std::fmt::Write;
use std::time::Duration;

const RULE: &str = "============================================================";

/// The four-part answer block
pub fn render_result(result: &QueryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "【回答】");
    let _ = writeln!(out, "{}", result.answer);

    if result.is_match() {
        let range = result.reported_range();
        let _ = writeln!(out);
        let _ = writeln!(out, "【検索ヒットのチャンクを含む文書】");
        let _ = writeln!(out, "{}", result.source_document);
        let _ = writeln!(out);
        let _ = writeln!(out, "【根拠情報の文字列範囲】");
        let _ = writeln!(out, "{}文字目〜{}文字目", range.start_char, range.end_char);
        let _ = writeln!(out);
        let _ = writeln!(out, "【根拠情報】");
        let _ = writeln!(out, "{}", result.evidence_text);
    } else {
        let _ = writeln!(out);
        let _ = writeln!(out, "関連する文書が見つかりませんでした。");
    }
    out
}

/// Answer block framed by rules, with timing and strategy
pub fn render_framed(query: &str, result: &QueryResult, elapsed: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "質問: {}", query);
    let _ = writeln!(
        out,
        "処理時間: {:.2}秒 (strategy: {}, confidence: {:.3})",
        elapsed.as_secs_f64(),
        result.strategy.as_str(),
        result.confidence
    );
    let _ = writeln!(out, "{}", RULE);
    out.push_str(&render_result(result));
    let _ = writeln!(out, "{}", RULE);
    out
}

pub fn banner() -> String {
    format!(
        "{rule}\nkonkyo v{version} - 根拠付き質問応答\n質問を入力してください。'help' で例を表示、'exit' / 'quit' / 'q' で終了します。\n{rule}",
        rule = RULE,
        version = konkyo_common::VERSION
    )
}

pub fn help() -> &'static str {
    "質問の例:\n  • コンバインとは何ですか\n  • コンバインは何種類に大別されますか\n  • どのような農業機械がありますか\n  • What is a combine harvester?"
}
