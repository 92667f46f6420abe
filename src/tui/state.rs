use crate::form::{FormField, FormState};
use crate::model::{ControllerEvent, Health, Mode, StatusLine};
use crate::orchestrator::UiCommand;
use crate::render::PreviewView;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What the UI loop should do after a key press.
pub(crate) enum KeyAction {
    Nothing,
    Send(UiCommand),
    Copy(String),
    Quit,
}

pub(crate) struct UiState {
    /// Form as it was at startup; a session reload restores it.
    initial_form: FormState,
    pub form: FormState,
    /// Index into `form.visible_fields()`.
    pub focus: usize,
    pub show_help: bool,
    pub confirm_run: bool,

    pub status: StatusLine,
    pub health: Health,
    pub config_path: Option<String>,
    pub busy: bool,
    pub dirty: bool,
    pub auto_preview: bool,

    pub view: PreviewView,
    pub selected_row: usize,
    pub closed: bool,
}

impl UiState {
    pub fn new(form: FormState, auto_preview: bool) -> Self {
        Self {
            initial_form: form.clone(),
            form,
            focus: 0,
            show_help: false,
            confirm_run: false,
            status: StatusLine::info("ready"),
            health: Health::Unknown,
            config_path: None,
            busy: false,
            dirty: false,
            auto_preview,
            view: PreviewView::default(),
            selected_row: 0,
            closed: false,
        }
    }

    pub fn focused_field(&self) -> FormField {
        let fields = self.form.visible_fields();
        fields[self.focus.min(fields.len() - 1)]
    }

    fn input_changed(&self) -> UiCommand {
        UiCommand::InputChanged(self.form.read_payload())
    }

    pub fn selected_path(&self) -> Option<&str> {
        self.view
            .rows
            .get(self.selected_row)
            .map(|r| r.full_path.as_str())
            .filter(|p| !p.is_empty())
    }

    /// Fold a controller event into the display. Some events feed a follow-up command back.
    pub fn apply_event(&mut self, ev: ControllerEvent) -> Option<UiCommand> {
        match ev {
            ControllerEvent::Status(s) => self.status = s,
            ControllerEvent::Busy(b) => self.busy = b,
            ControllerEvent::Dirty(d) => self.dirty = d,
            ControllerEvent::View(v) => {
                self.view = v;
                self.selected_row = 0;
            }
            ControllerEvent::Health(h) => self.health = h,
            ControllerEvent::ConfigPath(p) => self.config_path = p,
            ControllerEvent::DefaultBasePath(p) => {
                if self.form.base_path.trim().is_empty() {
                    self.form.base_path = p;
                }
                return Some(self.input_changed());
            }
            ControllerEvent::BasePathPicked(p) => {
                self.form.base_path = p;
                return Some(self.input_changed());
            }
            ControllerEvent::PreviewFinished(_) | ControllerEvent::RunFinished { .. } => {}
            ControllerEvent::SessionRestarted => {
                self.form = self.initial_form.clone();
                self.focus = 0;
                self.confirm_run = false;
                self.health = Health::Unknown;
                self.config_path = None;
                self.status = StatusLine::info("reloaded");
                return Some(self.input_changed());
            }
            ControllerEvent::Closed => self.closed = true,
        }
        None
    }

    pub fn handle_key(&mut self, k: KeyEvent) -> KeyAction {
        if self.confirm_run {
            self.confirm_run = false;
            let confirmed = matches!(k.code, KeyCode::Char('y') | KeyCode::Char('Y'));
            return KeyAction::Send(UiCommand::Run {
                payload: self.form.read_payload(),
                confirmed,
            });
        }

        let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);
        match k.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => KeyAction::Quit,
            KeyCode::F(1) => {
                self.show_help = !self.show_help;
                KeyAction::Nothing
            }
            KeyCode::Esc => {
                if self.show_help {
                    self.show_help = false;
                    KeyAction::Nothing
                } else if self.busy {
                    KeyAction::Send(UiCommand::CancelPreview)
                } else {
                    KeyAction::Nothing
                }
            }
            KeyCode::Enter | KeyCode::F(5) => {
                KeyAction::Send(UiCommand::Preview(self.form.read_payload()))
            }
            KeyCode::Char('p') if ctrl => {
                KeyAction::Send(UiCommand::Preview(self.form.read_payload()))
            }
            KeyCode::Char('r') if ctrl => {
                self.confirm_run = true;
                KeyAction::Nothing
            }
            KeyCode::Char('b') if ctrl => KeyAction::Send(UiCommand::PickFolder {
                initial_path: self.form.base_path.trim().to_string(),
            }),
            KeyCode::Char('s') if ctrl => {
                KeyAction::Send(UiCommand::SaveBasePath(self.form.base_path.clone()))
            }
            KeyCode::Char('o') if ctrl => {
                KeyAction::Send(UiCommand::OpenFolder(self.form.base_path.clone()))
            }
            KeyCode::Char('l') if ctrl => KeyAction::Send(UiCommand::Reload),
            KeyCode::Char('x') if ctrl => KeyAction::Send(UiCommand::Shutdown),
            KeyCode::Char('a') if ctrl => {
                self.auto_preview = !self.auto_preview;
                KeyAction::Send(UiCommand::SetAutoPreview(self.auto_preview))
            }
            KeyCode::Char('y') if ctrl => match self.selected_path() {
                Some(p) => KeyAction::Copy(p.to_string()),
                None => {
                    self.status = StatusLine::info("no row selected");
                    KeyAction::Nothing
                }
            },
            KeyCode::Tab | KeyCode::Down => {
                self.focus = (self.focus + 1) % self.form.visible_fields().len();
                KeyAction::Nothing
            }
            KeyCode::BackTab | KeyCode::Up => {
                let n = self.form.visible_fields().len();
                self.focus = (self.focus + n - 1) % n;
                KeyAction::Nothing
            }
            KeyCode::PageDown => {
                if self.selected_row + 1 < self.view.rows.len() {
                    self.selected_row += 1;
                }
                KeyAction::Nothing
            }
            KeyCode::PageUp => {
                self.selected_row = self.selected_row.saturating_sub(1);
                KeyAction::Nothing
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')
                if self.focused_field() == FormField::Mode =>
            {
                self.form.mode = self.form.mode.toggled();
                KeyAction::Send(self.input_changed())
            }
            KeyCode::Char(c) if !ctrl => {
                let field = self.focused_field();
                match self.form.text_mut(field) {
                    Some(text) => {
                        text.push(c);
                        KeyAction::Send(self.input_changed())
                    }
                    None => KeyAction::Nothing,
                }
            }
            KeyCode::Backspace => {
                let field = self.focused_field();
                match self.form.text_mut(field) {
                    Some(text) => {
                        text.pop();
                        KeyAction::Send(self.input_changed())
                    }
                    None => KeyAction::Nothing,
                }
            }
            _ => KeyAction::Nothing,
        }
    }

    /// Label shown for the mode toggle, e.g. `[Range] Days`.
    pub fn mode_toggle_text(&self) -> String {
        [Mode::Range, Mode::Days]
            .iter()
            .map(|m| {
                if *m == self.form.mode {
                    format!("[{}]", m.label())
                } else {
                    m.label().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
