//! Tour-guide prompt builder.

use wayfarer_core::types::{Coordinate, Landmark};

/// Rendered in place of an empty landmark block.
pub const NO_LANDMARKS: &str = "附近沒有明顯的地標。";

/// Describe where the user is: the resolved address when there is one,
/// otherwise the raw coordinates.
pub fn location_info(address: Option<&str>, at: &Coordinate) -> String {
    match address.map(str::trim).filter(|a| !a.is_empty()) {
        Some(address) => format!("目前位置：{address}"),
        None => format!("目前位置：緯度 {}，經度 {}", at.latitude, at.longitude),
    }
}

/// One line per landmark, nearest first as given.
pub fn format_landmarks(landmarks: &[Landmark]) -> String {
    if landmarks.is_empty() {
        return NO_LANDMARKS.to_string();
    }
    landmarks
        .iter()
        .map(|l| format!("{}（{}，距離約 {} 公尺）", l.name, l.category, l.distance_meters))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the instruction block sent alongside the still frame.
pub fn compose(question: &str, location_info: &str, landmarks_info: &str) -> String {
    let landmarks_info = if landmarks_info.trim().is_empty() {
        NO_LANDMARKS
    } else {
        landmarks_info
    };

    let mut parts = Vec::new();
    parts.push("你是一個專業的 AI 導遊，擅長解說景點和回答旅遊相關問題。".to_string());
    parts.push(format!("當前地理資訊：\n{location_info}"));
    parts.push(format!("附近的地標：\n{landmarks_info}"));
    parts.push(format!("使用者問題：\n{question}"));
    parts.push("請根據照片內容、位置資訊和附近地標，回答這個問題。".to_string());
    parts.push(
        [
            "回答要求：",
            "1. 根據照片與地點判斷他目前拍攝的是哪個地點？",
            "2. 推薦他接下來可以去哪裡？為什麼？",
            "3. 提供有趣的歷史背景或文化資訊（如果適用）",
            "4. 如果問題與照片內容無關，請友善地告知使用者",
            "5. 回答要簡潔有力，避免過於冗長",
            "6. 使用導遊式的親切語氣",
        ]
        .join("\n"),
    );

    parts.join("\n\n")
}
