//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::machine::{Machine, MachineState};
use super::app::{DebuggerApp, Target};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: listing and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_listing(frame, left_chunks[0], app);
    draw_status(frame, left_chunks[1], app);

    // Right side: one register panel per machine, queues, help
    let machines = app.machines();
    let mut constraints: Vec<Constraint> = machines
        .iter()
        .map(|_| Constraint::Min(6))
        .collect();
    if let Target::Pair(_) = app.target {
        constraints.push(Constraint::Length(4));
    }
    constraints.push(Constraint::Length(4));

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(chunks[1]);

    for (id, machine) in machines.iter().enumerate() {
        draw_registers(frame, right_chunks[id], app, id, machine);
    }
    if let Target::Pair(duet) = &app.target {
        draw_queues(frame, right_chunks[machines.len()], duet);
    }
    draw_help(frame, right_chunks[right_chunks.len() - 1]);
}

/// Draw the program listing around the current pc.
fn draw_listing(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let listing = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = listing
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:03}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else if app.program.get(*addr).is_some_and(|i| i.opcode().is_jump()) {
                Style::default().fg(Color::Blue)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let title = format!(" {} program ", app.variant);
    let list = List::new(items)
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw one machine's registers and counters.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp, id: usize, machine: &Machine) {
    let mut content = vec![
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{}", machine.pc()), Style::default().fg(Color::Yellow)),
            Span::raw("   Cycles: "),
            Span::styled(format!("{}", machine.cycles()), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", machine.state()), state_style(machine.state())),
        ]),
    ];

    let mut regs: Vec<Span> = Vec::new();
    for (reg, value) in machine.regs.iter() {
        regs.push(Span::raw(format!("{}=", reg)));
        regs.push(Span::styled(format!("{}  ", value), value_style(value)));
    }
    content.push(Line::from(regs));

    content.push(Line::from(vec![
        Span::raw("mul: "),
        Span::styled(format!("{}", machine.mul_count()), Style::default().fg(Color::White)),
        Span::raw("   sent: "),
        Span::styled(format!("{}", machine.sent()), Style::default().fg(Color::White)),
        Span::raw("   sound: "),
        Span::styled(
            machine.last_sound().map_or("-".to_string(), |v| v.to_string()),
            Style::default().fg(Color::White),
        ),
    ]));

    let title = match app.target {
        Target::Pair(_) => format!(" Program {} ", id),
        Target::Single(_) => " Registers ".to_string(),
    };
    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw the duet mailboxes.
fn draw_queues(frame: &mut Frame, area: Rect, duet: &crate::machine::Duet) {
    let mail = duet.mailboxes();
    let lines: Vec<Line> = (0..mail.slots())
        .map(|slot| {
            let queued: Vec<String> = mail
                .queue(slot)
                .map(|q| q.iter().map(|v| v.to_string()).collect())
                .unwrap_or_default();
            Line::from(format!("→{}: [{}]", slot, queued.join(", ")))
        })
        .collect();

    let paragraph = Paragraph::new(lines)
        .block(Block::default()
            .title(" Mailboxes ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(paragraph, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}

fn state_style(state: MachineState) -> Style {
    match state {
        MachineState::Running => Style::default().fg(Color::Green),
        MachineState::Blocked => Style::default().fg(Color::Yellow),
        MachineState::Halted => Style::default().fg(Color::Gray),
        MachineState::Faulted => Style::default().fg(Color::Red),
    }
}

/// Colour a register value by its sign.
fn value_style(value: i64) -> Style {
    match value.signum() {
        -1 => Style::default().fg(Color::Red),
        0 => Style::default().fg(Color::Gray),
        _ => Style::default().fg(Color::Green),
    }
}
