use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => {
            // Any keypress counts as the user interaction that unlocks audio.
            app.speech.notify_interaction();
            handle_key(app, key)?;
        }
        AppEvent::Mouse(mouse) => {
            app.speech.notify_interaction();
            handle_mouse(app, mouse);
        }
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.on_tick().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Tab cycles focus: Navigation -> Content -> Chat -> Navigation
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Navigation => {
                    if app.screen == Screen::Marketplace
                        && app.product_state.selected().is_none()
                        && !app.products.is_empty()
                    {
                        app.product_state.select(Some(0));
                    }
                    FocusPane::Content
                }
                FocusPane::Content => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Navigation,
            };
        }

        // Jump straight into the chat input
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.focus = FocusPane::Chat;
            app.input_mode = InputMode::Editing;
            // Cursor at end of existing text
            app.chat_cursor = app.chat_input.chars().count();
        }

        // Navigation/scrolling based on focus
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Navigation => app.nav_down(),
            FocusPane::Content => {
                if app.screen == Screen::Marketplace {
                    app.product_nav_down();
                } else {
                    app.scroll_down();
                }
            }
            FocusPane::Chat => app.chat_scroll_down(),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Navigation => app.nav_up(),
            FocusPane::Content => {
                if app.screen == Screen::Marketplace {
                    app.product_nav_up();
                } else {
                    app.scroll_up();
                }
            }
            FocusPane::Chat => app.chat_scroll_up(),
        },
        KeyCode::Char('g') => match app.focus {
            FocusPane::Content => {
                if app.screen == Screen::Marketplace {
                    if !app.products.is_empty() {
                        app.product_state.select(Some(0));
                    }
                } else {
                    app.content_scroll = 0;
                }
            }
            FocusPane::Chat => app.chat_scroll = 0,
            FocusPane::Navigation => {}
        },
        KeyCode::Char('G') => match app.focus {
            FocusPane::Content => {
                if app.screen == Screen::Marketplace {
                    let last = app.products.len().saturating_sub(1);
                    if !app.products.is_empty() {
                        app.product_state.select(Some(last));
                    }
                } else {
                    app.content_scroll =
                        app.total_content_lines.saturating_sub(app.content_height);
                }
            }
            FocusPane::Chat => app.scroll_chat_to_bottom(),
            FocusPane::Navigation => {}
        },

        // Half-page scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.focus == FocusPane::Content {
                app.scroll_half_page_down();
            }
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.focus == FocusPane::Content {
                app.scroll_half_page_up();
            }
        }

        // Enter/Select
        KeyCode::Enter => match app.focus {
            FocusPane::Navigation => app.nav_enter(),
            FocusPane::Content => {
                if app.screen == Screen::Marketplace {
                    app.toggle_selection();
                }
            }
            FocusPane::Chat => {
                app.input_mode = InputMode::Editing;
                app.chat_cursor = app.chat_input.chars().count();
            }
        },

        // Check/uncheck the product under the cursor
        KeyCode::Char(' ') => {
            if app.focus == FocusPane::Content && app.screen == Screen::Marketplace {
                app.toggle_selection();
            }
        }

        // Ask the agent to compare the checked products
        KeyCode::Char('c') => {
            if app.screen == Screen::Marketplace {
                app.compare_selected();
            }
        }

        // Stop the assistant's voice
        KeyCode::Char('s') => app.speech.stop(),

        // Toggle dictation
        KeyCode::Char('v') => toggle_mic(app),

        // Back to the navigation pane
        KeyCode::Esc => app.focus = FocusPane::Navigation,

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    // The input is disabled while a request is in flight, Esc still works.
    if app.loading && key.code != KeyCode::Esc {
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit_chat_input();
        }
        // Toggle dictation without leaving the input
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            toggle_mic(app);
        }
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
                if app.chat_input.is_empty() {
                    // Clearing the input by hand also clears the transcript
                    app.capture.reset_transcript();
                }
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
                if app.chat_input.is_empty() {
                    app.capture.reset_transcript();
                }
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.chat_cursor = 0;
        }
        KeyCode::End => {
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

fn toggle_mic(app: &mut App) {
    if app.capture.is_supported() && !app.loading {
        app.capture.toggle_listening();
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    // Determine which area the mouse is in (position-based scrolling)
    let in_nav = app.nav_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_content = app
        .content_area
        .map(|r| point_in_rect(x, y, r))
        .unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.chat_scroll = app.chat_scroll.saturating_add(3);
            } else if in_content {
                if app.screen == Screen::Marketplace {
                    app.product_nav_down();
                } else {
                    app.scroll_down();
                    app.scroll_down();
                    app.scroll_down();
                }
            } else if in_nav {
                app.nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.chat_scroll = app.chat_scroll.saturating_sub(3);
            } else if in_content {
                if app.screen == Screen::Marketplace {
                    app.product_nav_up();
                } else {
                    app.scroll_up();
                    app.scroll_up();
                    app.scroll_up();
                }
            } else if in_nav {
                app.nav_up();
            }
        }
        _ => {}
    }
}
