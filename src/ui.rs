use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};
use crate::agent::{Role, Turn};
use crate::app::{App, FocusPane, InputMode, Screen};

/// Indian digit grouping: the last three digits, then pairs (12,34,567).
fn format_inr(amount: i64) -> String {
    if amount < 0 {
        return format!("-{}", format_inr(-amount));
    }
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

/// Deal prices arrive as floats; paise only show when they are nonzero.
fn format_inr_price(value: f64) -> String {
    if value < 0.0 {
        return format!("-{}", format_inr_price(-value));
    }
    let mut rupees = value.trunc() as i64;
    let mut paise = (value.fract() * 100.0).round() as i64;
    if paise == 100 {
        rupees += 1;
        paise = 0;
    }
    if paise == 0 {
        format_inr(rupees)
    } else {
        format!("{}.{:02}", format_inr(rupees), paise)
    }
}

/// Convert **bold** markdown in a reply line to styled spans.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let Some(close) = rest[open + 2..].find("**") else {
            break; // unclosed marker stays literal
        };

        if open > 0 {
            spans.push(Span::raw(rest[..open].to_string()));
        }
        let bold = &rest[open + 2..open + 2 + close];
        if !bold.is_empty() {
            spans.push(Span::styled(
                bold.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        rest = &rest[open + 2 + close + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    // Body: navigation rail, screen content, chat panel
    let [nav_area, content_area, chat_area] = Layout::horizontal([
        Constraint::Length(22),
        Constraint::Min(0),
        Constraint::Percentage(38),
    ])
    .areas(body_area);

    // Store areas for mouse hit-testing
    app.nav_area = Some(nav_area);
    app.content_area = Some(content_area);
    app.chat_area = Some(chat_area);

    render_navigation(app, frame, nav_area);

    match app.screen {
        Screen::Marketplace => render_marketplace(app, frame, content_area),
        Screen::Deals => render_deals(app, frame, content_area),
        Screen::History => render_history(app, frame, content_area),
    }

    render_chat(app, frame, chat_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let checked = app.compare_count();
    let selection_note = if checked > 0 {
        format!(" [{} checked]", checked)
    } else {
        String::new()
    };

    let audio_note = if app.speech.has_pending() {
        " [audio waiting for a keypress]"
    } else {
        ""
    };

    let title = Line::from(vec![
        Span::styled(" Agentive ", Style::default().fg(Color::Cyan).bold()),
        Span::styled("AI shopping assistant", Style::default().fg(Color::Gray)),
        Span::styled(selection_note, Style::default().fg(Color::Gray)),
        Span::styled(audio_note, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Marketplace => " MARKET ",
        Screen::Deals => " DEALS ",
        Screen::History => " HISTORY ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Editing => {
            if app.loading {
                vec![
                    Span::styled(" Esc ", key_style),
                    Span::styled(" stop typing ", label_style),
                    Span::styled(
                        " waiting for the agent... ",
                        Style::default().bg(Color::Black).fg(Color::DarkGray),
                    ),
                ]
            } else {
                let mut hints = vec![
                    Span::styled(" Enter ", key_style),
                    Span::styled(" send ", label_style),
                    Span::styled(" Esc ", key_style),
                    Span::styled(" stop typing ", label_style),
                ];
                if app.capture.is_supported() {
                    hints.extend(vec![
                        Span::styled(" Ctrl-r ", key_style),
                        Span::styled(
                            if app.capture.is_listening() { " stop mic " } else { " mic " },
                            label_style,
                        ),
                    ]);
                }
                hints
            }
        }
        InputMode::Normal => {
            let mut hints = match app.focus {
                FocusPane::Navigation => vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" nav ", label_style),
                    Span::styled(" Enter ", key_style),
                    Span::styled(" open ", label_style),
                ],
                FocusPane::Content => match app.screen {
                    Screen::Marketplace => vec![
                        Span::styled(" j/k ", key_style),
                        Span::styled(" product ", label_style),
                        Span::styled(" Space ", key_style),
                        Span::styled(" check ", label_style),
                        Span::styled(" c ", key_style),
                        Span::styled(" compare ", label_style),
                    ],
                    _ => vec![
                        Span::styled(" j/k ", key_style),
                        Span::styled(" scroll ", label_style),
                    ],
                },
                FocusPane::Chat => vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" scroll ", label_style),
                    Span::styled(" Enter ", key_style),
                    Span::styled(" type ", label_style),
                ],
            };

            // Common hints
            hints.extend(vec![
                Span::styled(" Tab ", key_style),
                Span::styled(" focus ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
            ]);
            if app.capture.is_supported() {
                hints.extend(vec![
                    Span::styled(" v ", key_style),
                    Span::styled(" mic ", label_style),
                ]);
            }
            if app.speech.is_speaking() {
                hints.extend(vec![
                    Span::styled(" s ", key_style),
                    Span::styled(" stop audio ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_navigation(app: &mut App, frame: &mut Frame, area: Rect) {
    let nav_focused = app.focus == FocusPane::Navigation;
    let border_color = if nav_focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Screens ");

    let items: Vec<ListItem> = Screen::ALL
        .iter()
        .map(|screen| {
            let marker = match screen {
                Screen::Marketplace if !app.products.is_empty() => {
                    format!(" ({})", app.products.len())
                }
                Screen::Deals if app.deal.is_some() => " (1)".to_string(),
                _ => String::new(),
            };
            ListItem::new(format!(" {}{} ", screen.title(), marker))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.nav_state);
}

fn render_marketplace(app: &mut App, frame: &mut Frame, area: Rect) {
    let content_focused = app.focus == FocusPane::Content;
    let border_color = if content_focused { Color::Cyan } else { Color::DarkGray };

    let checked = app.compare_count();
    let title = if checked > 0 {
        format!(" Marketplace ({} checked, c to compare) ", checked)
    } else {
        " Marketplace ".to_string()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    if app.products.is_empty() {
        let welcome = Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "Welcome to Agentive",
                Style::default().fg(Color::Cyan).bold(),
            )),
            Line::default(),
            Line::from("Your AI-powered shopping assistant. Ask for a product to get started!"),
        ]);
        let placeholder = Paragraph::new(welcome)
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let items: Vec<ListItem> = app
        .products
        .iter()
        .map(|product| {
            // Terminals cannot show image_url; the initial-letter badge stands in.
            let mark = if app.is_selected(product) { "[x]" } else { "[ ]" };
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(format!(" {} ", mark), Style::default().fg(Color::Green)),
                    Span::styled(
                        format!("({})", product.badge_letter()),
                        Style::default().fg(Color::Magenta).bold(),
                    ),
                    Span::raw(" "),
                    Span::styled(
                        product.display_name().to_string(),
                        Style::default().fg(Color::Yellow).bold(),
                    ),
                ]),
                Line::from(format!(
                    "      {} | {}GB | ₹{}",
                    product.company_label(),
                    product.capacity_label(),
                    format_inr(product.price())
                )),
                Line::default(),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.product_state);
}

fn render_deals(app: &mut App, frame: &mut Frame, area: Rect) {
    let content_focused = app.focus == FocusPane::Content;
    let border_color = if content_focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Deals ");

    let inner = block.inner(area);
    app.content_height = inner.height;

    let Some(deal) = app.deal.as_ref() else {
        app.total_content_lines = 0;
        let placeholder = Paragraph::new("No active deals right now. Ask the agent for one!")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            "Active Deals",
            Style::default().fg(Color::Magenta).bold(),
        )),
        Line::default(),
        Line::from(Span::styled(
            deal.heading.as_str(),
            Style::default().fg(Color::Yellow).bold(),
        )),
        Line::from(Span::styled(
            format!("Deal price: ₹{}", format_inr_price(deal.deal_price)),
            Style::default().fg(Color::Green).bold(),
        )),
    ];

    if !deal.products_involved.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from("Includes:"));
        for product in &deal.products_involved {
            lines.push(Line::from(format!(
                "  ({}) {} | {} | {}GB | ₹{}",
                product.badge_letter(),
                product.display_name(),
                product.company_label(),
                product.capacity_label(),
                format_inr(product.price())
            )));
        }
    }

    app.total_content_lines = lines.len() as u16;

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.content_scroll, 0));

    frame.render_widget(paragraph, area);
    render_content_scrollbar(app, frame, area);
}

fn render_history(app: &mut App, frame: &mut Frame, area: Rect) {
    let content_focused = app.focus == FocusPane::Content;
    let border_color = if content_focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chat History ({} turns) ", app.history.len()));

    let inner = block.inner(area);
    app.content_height = inner.height;

    let lines = conversation_lines(&app.history, None);
    app.total_content_lines = lines.len() as u16;

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.content_scroll, 0));

    frame.render_widget(paragraph, area);
    render_content_scrollbar(app, frame, area);
}

/// The transcript as rendered lines: a role label, the turn's text, a blank
/// line. Assistant text goes through the markdown pass; user text does not.
fn conversation_lines(history: &[Turn], thinking: Option<u8>) -> Vec<Line<'_>> {
    let mut lines: Vec<Line> = Vec::new();

    for turn in history {
        match turn.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in turn.content.lines() {
                    lines.push(Line::from(line));
                }
                lines.push(Line::default());
            }
            Role::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Agent:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in turn.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
                lines.push(Line::default());
            }
        }
    }

    if let Some(frame) = thinking {
        lines.push(Line::from(Span::styled(
            "Agent:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat(frame as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    let chat_focused = app.focus == FocusPane::Chat;
    let border_color = if chat_focused { Color::Cyan } else { Color::DarkGray };

    let title = if app.speech.is_speaking() {
        " Conversation (speaking, s to stop) "
    } else {
        " Conversation "
    };

    let transcript_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Store inner dimensions for the scroll-to-bottom wrap math.
    app.chat_height = transcript_area.height.saturating_sub(2);
    app.chat_width = transcript_area.width.saturating_sub(2);

    let thinking = if app.loading {
        Some(app.animation_frame)
    } else {
        None
    };

    let transcript = Paragraph::new(conversation_lines(&app.history, thinking))
        .block(transcript_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(transcript, transcript_area);

    render_chat_input(app, frame, input_area);
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing {
        Color::Yellow
    } else if app.focus == FocusPane::Chat {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let title = if app.capture.is_listening() {
        " Message (recording) "
    } else {
        " Message (i to type) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    if app.chat_input.is_empty() {
        let placeholder = if app.capture.is_listening() {
            "Listening..."
        } else if app.loading {
            "Waiting for response..."
        } else {
            "Find me a product..."
        };
        let input = Paragraph::new(placeholder)
            .style(Style::default().fg(Color::DarkGray))
            .block(input_block);
        frame.render_widget(input, area);
        if editing {
            frame.set_cursor_position((area.x + 1, area.y + 1));
        }
        return;
    }

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .chat_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    // Cyan text to match the "You:" style - visible in both light and dark terminals
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_content_scrollbar(app: &App, frame: &mut Frame, area: Rect) {
    if app.total_content_lines <= app.content_height {
        return;
    }

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
        .begin_symbol(Some("^"))
        .end_symbol(Some("v"));

    let mut scrollbar_state = ScrollbarState::new(app.total_content_lines as usize)
        .position(app.content_scroll as usize);

    frame.render_stateful_widget(
        scrollbar,
        area.inner(ratatui::layout::Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar_state,
    );
}
