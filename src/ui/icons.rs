//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!!]");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Pipeline stages
pub static KEY: Emoji<'_, '_> = Emoji("🔑 ", "[K]");
pub static TICKET: Emoji<'_, '_> = Emoji("🎟️  ", "[C]");
pub static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[D]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");

// Output
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
