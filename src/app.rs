use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use std::collections::HashSet;
use tracing::error;

use crate::agent::{AgentClient, ChatResponse, Product, SpecialDeal, Turn};
use crate::config::Config;
use crate::speech::{AudioUnlock, RodioOutput, SpeechCapture, SpeechPlayer};

pub const WELCOME_MESSAGE: &str =
    "Hello! What are you looking for today? I can help you find products and negotiate prices.";

pub const ERROR_REPLY: &str = "Sorry, an error occurred while fetching the response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Marketplace,
    Deals,
    History,
}

impl Screen {
    pub const ALL: [Screen; 3] = [Screen::Marketplace, Screen::Deals, Screen::History];

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Marketplace => "Marketplace",
            Screen::Deals => "Deals",
            Screen::History => "Chat History",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Navigation,
    Content,
    Chat,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub nav_state: ListState,

    // Conversation state
    pub history: Vec<Turn>,
    pub chat_input: String,
    pub chat_cursor: usize, // cursor position in chat_input, in chars
    pub loading: bool,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub chat_task: Option<tokio::task::JoinHandle<anyhow::Result<ChatResponse>>>,

    // Marketplace state
    pub products: Vec<Product>,
    pub product_state: ListState,
    pub selected_ids: HashSet<String>,

    // Deal state
    pub deal: Option<SpecialDeal>,

    // Content scrolling (deals and history screens)
    pub content_scroll: u16,
    pub content_height: u16,
    pub total_content_lines: u16,

    // Speech
    pub speech: SpeechPlayer,
    pub capture: SpeechCapture,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub nav_area: Option<Rect>,
    pub content_area: Option<Rect>,
    pub chat_area: Option<Rect>,

    // Backend
    pub agent: AgentClient,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let agent = AgentClient::new(&config.backend_url);
        let speech = SpeechPlayer::new(
            Box::new(RodioOutput::new(config.playback_volume)),
            AudioUnlock::new(),
        );
        let capture = SpeechCapture::detect(config);

        let mut app = Self::with_parts(agent, speech, capture);
        if let Some(url) = config.welcome_audio_url.as_deref() {
            app.speech.play(url);
        }
        app
    }

    /// Wires the coordinator up from parts; tests swap in fakes here.
    pub fn with_parts(agent: AgentClient, speech: SpeechPlayer, capture: SpeechCapture) -> Self {
        let mut nav_state = ListState::default();
        nav_state.select(Some(0));

        Self {
            should_quit: false,
            screen: Screen::Marketplace,
            input_mode: InputMode::Normal,
            focus: FocusPane::Navigation,
            nav_state,

            history: vec![Turn::assistant(WELCOME_MESSAGE)],
            chat_input: String::new(),
            chat_cursor: 0,
            loading: false,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_task: None,

            products: Vec::new(),
            product_state: ListState::default(),
            selected_ids: HashSet::new(),

            deal: None,

            content_scroll: 0,
            content_height: 0,
            total_content_lines: 0,

            speech,
            capture,

            animation_frame: 0,

            nav_area: None,
            content_area: None,
            chat_area: None,

            agent,
        }
    }

    /// One user turn: stop the assistant's voice, append the message, fire
    /// the request. The request's history is the conversation as it stood
    /// before this turn; the new message travels only in `user_message`.
    pub fn send_message(&mut self, message: &str) {
        let message = message.trim();
        if message.is_empty() || self.loading {
            return;
        }

        self.speech.stop();
        self.loading = true;

        let snapshot = self.history.clone();
        self.history.push(Turn::user(message));
        self.scroll_chat_to_bottom();

        let agent = self.agent.clone();
        let message = message.to_string();
        self.chat_task = Some(tokio::spawn(async move {
            agent.chat(&message, &snapshot).await
        }));
    }

    /// Sends whatever is typed (or dictated) in the input box.
    pub fn submit_chat_input(&mut self) {
        if self.chat_input.trim().is_empty() || self.loading {
            return;
        }
        let message = self.chat_input.trim().to_string();
        self.clear_chat_input();
        self.send_message(&message);
    }

    /// Clears the input box and the transcript that may have filled it.
    pub fn clear_chat_input(&mut self) {
        self.chat_input.clear();
        self.chat_cursor = 0;
        self.capture.reset_transcript();
    }

    /// Picks up a finished request, if any. Driven by the tick event.
    pub async fn poll_exchange(&mut self) {
        let finished = self
            .chat_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.chat_task.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(anyhow::anyhow!("chat task failed: {err}")),
            };
            self.finish_exchange(outcome);
        }
    }

    fn finish_exchange(&mut self, outcome: anyhow::Result<ChatResponse>) {
        match outcome {
            Ok(reply) => {
                self.history.push(Turn::assistant(&reply.text));

                if let Some(url) = reply.audio_url.as_deref() {
                    self.speech.play(url);
                }

                // An empty product list keeps the last known results on screen.
                if !reply.products.is_empty() {
                    self.products = reply.products;
                    self.product_state.select(Some(0));
                    self.set_screen(Screen::Marketplace);
                }

                if let Some(deal) = reply.special_deal {
                    self.deal = Some(deal);
                    self.set_screen(Screen::Deals);
                }
            }
            Err(err) => {
                error!("chat request failed: {err}");
                self.history.push(Turn::assistant(ERROR_REPLY));
            }
        }

        self.loading = false;
        self.scroll_chat_to_bottom();
    }

    /// Periodic upkeep driven by the tick event.
    pub async fn on_tick(&mut self) {
        self.tick_animation();
        self.poll_exchange().await;
        self.speech.poll();
        self.sync_transcript();
    }

    fn sync_transcript(&mut self) {
        self.capture.poll();
        if let Some(text) = self.capture.take_update() {
            self.chat_cursor = text.chars().count();
            self.chat_input = text;
        }
    }

    // Screen navigation
    pub fn nav_down(&mut self) {
        let len = Screen::ALL.len();
        let i = self.nav_state.selected().unwrap_or(0);
        self.nav_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn nav_up(&mut self) {
        let i = self.nav_state.selected().unwrap_or(0);
        self.nav_state.select(Some(i.saturating_sub(1)));
    }

    pub fn nav_enter(&mut self) {
        if let Some(screen) = self.nav_state.selected().and_then(|i| Screen::ALL.get(i)) {
            self.set_screen(*screen);
        }
    }

    pub fn set_screen(&mut self, screen: Screen) {
        if self.screen != screen {
            self.content_scroll = 0;
        }
        self.screen = screen;
        if let Some(idx) = Screen::ALL.iter().position(|s| *s == screen) {
            self.nav_state.select(Some(idx));
        }
    }

    // Product list navigation
    pub fn product_nav_down(&mut self) {
        let len = self.products.len();
        if len > 0 {
            let i = self.product_state.selected().unwrap_or(0);
            self.product_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn product_nav_up(&mut self) {
        let i = self.product_state.selected().unwrap_or(0);
        self.product_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_product(&self) -> Option<&Product> {
        self.product_state.selected().and_then(|i| self.products.get(i))
    }

    // Selection for comparison
    pub fn is_selected(&self, product: &Product) -> bool {
        product
            .id
            .as_ref()
            .map(|id| self.selected_ids.contains(id))
            .unwrap_or(false)
    }

    /// Toggles the product under the cursor in or out of the comparison set.
    /// Products without an ID cannot be selected.
    pub fn toggle_selection(&mut self) {
        let id = self.selected_product().and_then(|p| p.id.clone());
        if let Some(id) = id {
            if !self.selected_ids.remove(&id) {
                self.selected_ids.insert(id);
            }
        }
    }

    /// How many of the currently listed products are checked. Stale IDs from
    /// earlier result sets do not count.
    pub fn compare_count(&self) -> usize {
        self.products.iter().filter(|p| self.is_selected(p)).count()
    }

    /// The comparison turn, or None when fewer than two products are checked.
    pub fn compare_message(&self) -> Option<String> {
        let names: Vec<String> = self
            .products
            .iter()
            .filter(|p| self.is_selected(p))
            .map(|p| format!("{} ({}GB)", p.display_name(), p.capacity_label()))
            .collect();
        if names.len() < 2 {
            return None;
        }
        Some(format!(
            "Can you compare these products for me: {}?",
            names.join(" vs ")
        ))
    }

    /// Comparison is just a templated chat message.
    pub fn compare_selected(&mut self) {
        if let Some(message) = self.compare_message() {
            self.send_message(&message);
        }
    }

    // Content scrolling
    pub fn scroll_down(&mut self) {
        if self.content_scroll < self.total_content_lines.saturating_sub(self.content_height) {
            self.content_scroll = self.content_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.content_scroll = self.content_scroll.saturating_sub(1);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half_page = self.content_height / 2;
        let max_scroll = self.total_content_lines.saturating_sub(self.content_height);
        self.content_scroll = (self.content_scroll + half_page).min(max_scroll);
    }

    pub fn scroll_half_page_up(&mut self) {
        let half_page = self.content_height / 2;
        self.content_scroll = self.content_scroll.saturating_sub(half_page);
    }

    // Chat scrolling
    pub fn chat_scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn chat_scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    /// Scroll the chat so the latest turn (or the thinking indicator) is
    /// visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 40 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            40
        };

        let mut total_lines: u16 = 0;

        for turn in &self.history {
            total_lines += 1; // Role line ("You:" or "Agent:")
            for line in turn.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1; // Empty line still takes one line
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after turn
        }

        if self.loading {
            total_lines += 2; // "Agent:" + thinking line
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Role;
    use crate::speech::{AudioError, AudioOutput, AudioVoice};

    struct NullOutput;

    impl AudioOutput for NullOutput {
        fn begin(&mut self, _url: &str) -> Result<Box<dyn AudioVoice>, AudioError> {
            Err(AudioError::DeviceUnavailable)
        }

        fn resume(&mut self) {}
    }

    fn test_app() -> App {
        App::with_parts(
            AgentClient::new("http://127.0.0.1:1/chat"),
            SpeechPlayer::new(Box::new(NullOutput), AudioUnlock::new()),
            SpeechCapture::unsupported(),
        )
    }

    fn product(id: i64, name: &str, capacity: i64) -> Product {
        serde_json::from_value(serde_json::json!({
            "ID": id,
            "Model Name": name,
            "Capacity": capacity,
        }))
        .unwrap()
    }

    fn reply(value: serde_json::Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn history_starts_with_the_welcome_turn() {
        let app = test_app();
        assert_eq!(app.history.len(), 1);
        assert_eq!(app.history[0].role, Role::Assistant);
        assert_eq!(app.history[0].content, WELCOME_MESSAGE);
    }

    #[test]
    fn toggling_twice_restores_membership() {
        let mut app = test_app();
        app.products = vec![product(1, "CoolBreeze", 0)];
        app.product_state.select(Some(0));

        app.toggle_selection();
        assert!(app.selected_ids.contains("1"));
        app.toggle_selection();
        assert!(!app.selected_ids.contains("1"));
    }

    #[test]
    fn products_without_an_id_cannot_be_selected() {
        let mut app = test_app();
        app.products = vec![serde_json::from_value(serde_json::json!({})).unwrap()];
        app.product_state.select(Some(0));

        app.toggle_selection();
        assert!(app.selected_ids.is_empty());
    }

    #[test]
    fn compare_needs_more_than_one_checked_product() {
        let mut app = test_app();
        app.products = vec![product(1, "CoolBreeze", 0), product(2, "WindMax", 64)];
        app.selected_ids.insert("1".to_string());
        assert!(app.compare_message().is_none());

        app.selected_ids.insert("2".to_string());
        assert_eq!(
            app.compare_message().as_deref(),
            Some("Can you compare these products for me: CoolBreeze (0GB) vs WindMax (64GB)?")
        );
    }

    #[test]
    fn stale_selections_are_ignored_by_compare() {
        let mut app = test_app();
        app.products = vec![product(1, "CoolBreeze", 0), product(2, "WindMax", 64)];
        app.selected_ids.insert("1".to_string());
        app.selected_ids.insert("2".to_string());
        app.selected_ids.insert("99".to_string()); // from an older result set

        assert_eq!(app.compare_count(), 2);
        let message = app.compare_message().unwrap();
        assert!(!message.contains("99"));
    }

    #[test]
    fn products_in_a_reply_switch_to_the_marketplace() {
        let mut app = test_app();
        app.set_screen(Screen::History);
        app.loading = true;

        app.finish_exchange(Ok(reply(serde_json::json!({
            "text": "Here are some fans",
            "products": [{"ID": 1, "Model Name": "CoolBreeze", "Capacity": 0, "Max Price": 1999}]
        }))));

        assert_eq!(app.screen, Screen::Marketplace);
        assert_eq!(app.products.len(), 1);
        assert_eq!(app.product_state.selected(), Some(0));
        assert!(!app.loading);
        assert_eq!(app.history.last().unwrap().content, "Here are some fans");
    }

    #[test]
    fn empty_product_list_keeps_previous_results() {
        let mut app = test_app();
        app.products = vec![product(1, "CoolBreeze", 0)];
        app.set_screen(Screen::History);
        app.loading = true;

        app.finish_exchange(Ok(reply(serde_json::json!({"text": "Anything else?"}))));

        assert_eq!(app.screen, Screen::History);
        assert_eq!(app.products.len(), 1);
    }

    #[test]
    fn a_deal_switches_to_the_deals_screen() {
        let mut app = test_app();
        app.loading = true;

        app.finish_exchange(Ok(reply(serde_json::json!({
            "text": "Got you a bundle",
            "special_deal": {"heading": "Bundle offer", "deal_price": 2499.0}
        }))));

        assert_eq!(app.screen, Screen::Deals);
        assert_eq!(app.deal.as_ref().unwrap().heading, "Bundle offer");
    }

    #[test]
    fn a_failed_exchange_appends_the_apology() {
        let mut app = test_app();
        app.products = vec![product(1, "CoolBreeze", 0)];
        app.loading = true;

        app.finish_exchange(Err(anyhow::anyhow!("boom")));

        assert!(!app.loading);
        assert_eq!(app.history.last().unwrap().content, ERROR_REPLY);
        assert_eq!(app.products.len(), 1);
        assert!(app.deal.is_none());
    }

    #[test]
    fn reply_audio_is_handed_to_the_player() {
        let mut app = test_app();
        app.loading = true;

        app.finish_exchange(Ok(reply(serde_json::json!({
            "text": "Here you go",
            "audio_url": "https://cdn.example.com/clip.wav"
        }))));

        // NullOutput has no device, so the clip parks in the pending slot.
        assert!(app.speech.has_pending());
    }

    #[test]
    fn nav_enter_switches_screens_and_resets_scroll() {
        let mut app = test_app();
        app.content_scroll = 7;
        app.nav_state.select(Some(1));
        app.nav_enter();
        assert_eq!(app.screen, Screen::Deals);
        assert_eq!(app.content_scroll, 0);
    }
}
